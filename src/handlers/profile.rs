// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::User,
    utils::{hash::hash_password, jwt::Claims},
};

/// Aggregated profile data for the signed-in teacher.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub account_kind: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub name: String,
    pub school: Option<String>,
    pub teacher_code: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub quizzes_count: i64,
    pub classes_count: i64,
    pub students_count: i64,
}

pub async fn get_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.account_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(teacher_id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Account not found".to_string()))?;

    let quizzes_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM quizzes WHERE teacher_id = $1")
            .bind(teacher_id)
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let classes_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM classes WHERE teacher_id = $1")
            .bind(teacher_id)
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let students_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE teacher_id = $1")
            .bind(teacher_id)
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(ProfileResponse {
        id: user.id,
        account_kind: user.account_kind,
        email: user.email,
        username: user.username,
        name: user.name,
        school: user.school,
        teacher_code: user.teacher_code.unwrap_or_default(),
        expires_at: user.expires_at,
        quizzes_count,
        classes_count,
        students_count,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 200))]
    pub school: Option<String>,
}

pub async fn update_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    sqlx::query("UPDATE users SET name = $1, school = $2 WHERE id = $3")
        .bind(payload.name.trim())
        .bind(&payload.school)
        .bind(claims.account_id()?)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 4, max = 128))]
    pub password: String,
}

pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(&hashed_password)
        .bind(claims.account_id()?)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "updated": true })))
}
