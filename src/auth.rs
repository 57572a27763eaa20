//! Users, bearer-token sessions, and the middleware that resolves the caller
//! before any domain logic runs.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, query_scalar};
use uuid::Uuid;

use crate::db::Db;
use crate::error::AppError;
use crate::routes::AppState;

const SESSION_TTL_DAYS: i64 = 30;

/// The resolved caller, attached to request extensions by the middleware.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CallerContext {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

pub async fn register(
    db: &Db,
    name: &str,
    email: &str,
    password: &str,
) -> Result<CallerContext, AppError> {
    if name.trim().is_empty() || !email.contains('@') {
        return Err(AppError::InvalidPayload("name and email are required".into()));
    }
    if password.len() < 8 {
        return Err(AppError::InvalidPayload(
            "password must be at least 8 characters".into(),
        ));
    }
    let taken = query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(db)
        .await?;
    if taken > 0 {
        return Err(AppError::InvalidPayload("email already registered".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?
        .to_string();
    let res = query("INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(&password_hash)
        .bind(Utc::now())
        .execute(db)
        .await?;
    Ok(CallerContext {
        user_id: res.last_insert_rowid(),
        name: name.to_string(),
        email: email.to_string(),
    })
}

/// Verifies credentials and mints a session token.
pub async fn login(db: &Db, email: &str, password: &str) -> Result<String, AppError> {
    let row = query_as::<_, (i64, String)>("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let parsed = PasswordHash::new(&row.1)
        .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {e}"))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(AppError::Unauthorized);
    }

    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(row.0)
        .bind(now)
        .bind(now + Duration::days(SESSION_TTL_DAYS))
        .execute(db)
        .await?;
    Ok(token)
}

pub async fn logout(db: &Db, token: &str) -> Result<(), AppError> {
    query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn resolve_session(db: &Db, token: &str) -> Result<Option<CallerContext>, AppError> {
    let caller = query_as::<_, CallerContext>(
        r#"
        SELECT users.id AS user_id, users.name, users.email
        FROM sessions INNER JOIN users ON users.id = sessions.user_id
        WHERE sessions.token = ? AND sessions.expires_at > ?
        "#,
    )
    .bind(token)
    .bind(Utc::now())
    .fetch_optional(db)
    .await?;
    Ok(caller)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Rejects with 401 before any handler runs; on success the handler receives
/// the caller through `Extension<CallerContext>`.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or(AppError::Unauthorized)?;
    let caller = resolve_session(&state.db, token)
        .await?
        .ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
