use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("course not found")]
    CourseNotFound,
    #[error("no progress exists for this course")]
    ProgressNotFound,
    #[error("course has not been started")]
    NoActiveProgress,
    #[error("invalid target status: {0}")]
    InvalidTransition(String),
    #[error("all milestones must be validated before completion")]
    IncompleteMilestones { missing: Vec<i64> },
    #[error("milestone {required}% must be validated first")]
    OutOfOrderMilestone { required: i64 },
    #[error("{0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() }))
            }
            AppError::CourseNotFound | AppError::ProgressNotFound => {
                (StatusCode::NOT_FOUND, json!({ "error": self.to_string() }))
            }
            AppError::IncompleteMilestones { missing } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "missing_milestones": missing }),
            ),
            AppError::OutOfOrderMilestone { required } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "required_milestone": required }),
            ),
            AppError::NoActiveProgress
            | AppError::InvalidTransition(_)
            | AppError::InvalidPayload(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
