use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{self, CallerContext};
use crate::db::Db;
use crate::error::AppError;
use crate::milestones;
use crate::models::{
    CreateCourseReq, FavoriteUpdateReq, ProgressFields, ProgressTransitionReq, ReviewUpdateReq,
    ValidateMilestoneReq,
};
use crate::progress;
use crate::report::ReportGenerator;
use crate::store;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub reporter: Arc<dyn ReportGenerator>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            "/api/courses/progress",
            get(get_progress)
                .post(transition_progress)
                .put(update_review)
                .patch(patch_progress)
                .delete(delete_progress),
        )
        .route(
            "/api/courses/milestones",
            get(get_milestones).post(validate_milestone),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .with_state(state)
}

#[derive(Deserialize)]
struct CourseQuery {
    course_id: i64,
}

// --- auth ---

#[derive(Deserialize)]
struct RegisterReq {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> Result<Json<CallerContext>, AppError> {
    let caller = auth::register(&state.db, &req.name, &req.email, &req.password).await?;
    Ok(Json(caller))
}

#[derive(Deserialize)]
struct LoginReq {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<Json<Value>, AppError> {
    let token = auth::login(&state.db, &req.email, &req.password).await?;
    Ok(Json(json!({ "token": token })))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if let Some(token) = auth::bearer_token(&headers) {
        auth::logout(&state.db, token).await?;
    }
    Ok(Json(json!({ "message": "logged out" })))
}

// --- courses ---

async fn list_courses(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let courses = store::list_courses(&state.db).await?;
    Ok(Json(json!({ "courses": courses })))
}

async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<CreateCourseReq>,
) -> Result<Json<Value>, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::InvalidPayload("title is required".into()));
    }
    let course = store::insert_course(&state.db, &req.title, req.description.as_deref()).await?;
    Ok(Json(json!({ "course": course })))
}

// --- progress ---

async fn get_progress(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Query(q): Query<CourseQuery>,
) -> Result<Json<Value>, AppError> {
    let course = store::get_course(&state.db, q.course_id)
        .await?
        .ok_or(AppError::CourseNotFound)?;
    match store::get_progress(&state.db, caller.user_id, q.course_id).await? {
        Some(rec) => Ok(Json(json!({ "course": course, "progress": rec }))),
        None => Ok(Json(json!({ "status": "not_started", "course": course }))),
    }
}

async fn transition_progress(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<ProgressTransitionReq>,
) -> Result<Json<Value>, AppError> {
    let rec = progress::set_status(
        &state.db,
        caller.user_id,
        req.course_id,
        req.status,
        req.fields,
    )
    .await?;
    Ok(Json(json!({ "progress": rec })))
}

async fn update_review(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<ReviewUpdateReq>,
) -> Result<Json<Value>, AppError> {
    let fields = ProgressFields {
        notes: req.notes,
        rating: req.rating,
        difficulty: req.difficulty,
        review: req.review,
        ..Default::default()
    };
    let rec = progress::update_review(&state.db, caller.user_id, req.course_id, fields).await?;
    Ok(Json(json!({ "progress": rec })))
}

async fn patch_progress(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<FavoriteUpdateReq>,
) -> Result<Json<Value>, AppError> {
    let fields = ProgressFields {
        progress_percentage: req.progress_percentage,
        current_position: req.current_position,
        time_spent: req.time_spent,
        ..Default::default()
    };
    let rec = progress::update_partial(
        &state.db,
        caller.user_id,
        req.course_id,
        req.favorite,
        fields,
    )
    .await?;
    Ok(Json(json!({ "progress": rec })))
}

async fn delete_progress(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Query(q): Query<CourseQuery>,
) -> Result<Json<Value>, AppError> {
    progress::delete(&state.db, caller.user_id, q.course_id).await?;
    Ok(Json(json!({ "message": "progress deleted" })))
}

// --- milestones ---

async fn get_milestones(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Query(q): Query<CourseQuery>,
) -> Result<Json<milestones::MilestoneView>, AppError> {
    let view = milestones::progress_view(&state.db, caller.user_id, q.course_id).await?;
    Ok(Json(view))
}

async fn validate_milestone(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Json(req): Json<ValidateMilestoneReq>,
) -> Result<Json<Value>, AppError> {
    let outcome = milestones::validate(
        &state.db,
        &*state.reporter,
        caller.user_id,
        req.course_id,
        req.percentage,
        req.reflection,
    )
    .await?;

    let message = if outcome.already_completed {
        "milestone already validated"
    } else {
        "milestone validated"
    };
    let mut body = json!({
        "milestone": outcome.milestone,
        "report": outcome.report,
        "message": message,
    });
    if let Some(warning) = outcome.warning {
        body["warning"] = json!(warning);
    }
    Ok(Json(body))
}
