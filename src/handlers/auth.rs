// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        student::{Student, StudentLoginRequest},
        user::{LoginRequest, User},
    },
    utils::{hash::verify_password, jwt::sign_jwt},
};

/// Authenticates a teacher or the admin and returns a JWT token.
///
/// `identifier` is matched against both email (for 'email' accounts) and
/// username (for 'simple' accounts handed out by the admin). Expired teacher
/// accounts are refused with 403 so the dashboard never loads for them.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE (email = $1 OR username = $1) AND role IN ('teacher', 'admin')
        "#,
    )
    .bind(&payload.identifier)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = user.ok_or(AppError::AuthError("Account not found".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    if user.role == "teacher" && user.is_expired(chrono::Utc::now()) {
        return Err(AppError::Forbidden(
            "Account expired. Contact the administrator to renew access.".to_string(),
        ));
    }

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role,
        "name": user.name,
        "teacher_code": user.teacher_code,
    })))
}

/// Authenticates a student by username.
pub async fn student_login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<StudentLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Student login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::AuthError("Account not found".to_string()))?;

    if !verify_password(&payload.password, &student.password)? {
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    let token = sign_jwt(student.id, "student", &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "student": {
            "id": student.id,
            "full_name": student.full_name,
            "class_id": student.class_id,
        },
    })))
}
