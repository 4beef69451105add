// src/handlers/admin.rs

use std::sync::LazyLock;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use regex::Regex;
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{TeacherView, User},
    utils::hash::hash_password,
};

static TEACHER_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{3,12}$").expect("teacher code regex"));

/// Normalizes and validates a teacher code.
fn normalize_teacher_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_uppercase();
    if !TEACHER_CODE_RE.is_match(&code) {
        return Err(AppError::BadRequest(
            "Teacher code must be 3-12 uppercase letters or digits".to_string(),
        ));
    }
    Ok(code)
}

/// Lists all teacher accounts, newest first.
/// Admin only.
pub async fn list_teachers(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE role = 'teacher' ORDER BY id DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list teachers: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let now = chrono::Utc::now();
    let views: Vec<TeacherView> = users
        .into_iter()
        .map(|u| TeacherView::from_user(u, now))
        .collect();

    Ok(Json(views))
}

/// DTO for creating a teacher account.
/// 'email' accounts need an email, 'simple' accounts a username.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeacherRequest {
    pub account_kind: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(length(min = 4, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 200))]
    pub school: Option<String>,
    pub teacher_code: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Creates a teacher account.
/// Admin only.
pub async fn create_teacher(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTeacherRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let code = normalize_teacher_code(&payload.teacher_code)?;

    let (email, username) = match payload.account_kind.as_str() {
        "email" => {
            let email = payload
                .email
                .clone()
                .ok_or(AppError::BadRequest("Email accounts need an email".to_string()))?;
            (Some(email), None)
        }
        "simple" => {
            let username = payload
                .username
                .clone()
                .ok_or(AppError::BadRequest("Simple accounts need a username".to_string()))?;
            (None, Some(username))
        }
        other => {
            return Err(AppError::BadRequest(format!("Unknown account kind '{}'", other)));
        }
    };

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (role, account_kind, email, username, password, name, school, teacher_code, expires_at)
        VALUES ('teacher', $1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&payload.account_kind)
    .bind(&email)
    .bind(&username)
    .bind(&hashed_password)
    .bind(&payload.name)
    .bind(&payload.school)
    .bind(&code)
    .bind(payload.expires_at)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict("Teacher code, email or username already in use".to_string())
        } else {
            tracing::error!("Failed to create teacher: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

#[derive(Debug, Deserialize)]
pub struct ImportTeachersRequest {
    /// One simple account per line: "name, code, school, username, password".
    pub lines: String,
}

/// Bulk-creates simple teacher accounts from pasted lines.
/// Lines with malformed fields or already-used codes are skipped and
/// reported back, the rest are committed together.
pub async fn import_teachers(
    State(pool): State<PgPool>,
    Json(payload): Json<ImportTeachersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut created = 0usize;
    let mut skipped: Vec<String> = Vec::new();

    let mut tx = pool.begin().await?;

    for (line_no, line) in payload.lines.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split([',', '\t']).map(str::trim).collect();
        if fields.len() != 5 {
            skipped.push(format!("line {}: expected 5 fields", line_no + 1));
            continue;
        }
        let (name, raw_code, school, username, password) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        let code = match normalize_teacher_code(raw_code) {
            Ok(code) => code,
            Err(_) => {
                skipped.push(format!("line {}: bad teacher code '{}'", line_no + 1, raw_code));
                continue;
            }
        };
        if name.is_empty() || username.len() < 3 || password.len() < 4 {
            skipped.push(format!("line {}: bad name/username/password", line_no + 1));
            continue;
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE teacher_code = $1 OR username = $2)",
        )
        .bind(&code)
        .bind(username)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            skipped.push(format!("line {}: code or username already in use", line_no + 1));
            continue;
        }

        let hashed_password = hash_password(password)?;
        sqlx::query(
            r#"
            INSERT INTO users (role, account_kind, username, password, name, school, teacher_code)
            VALUES ('teacher', 'simple', $1, $2, $3, $4, $5)
            "#,
        )
        .bind(username)
        .bind(&hashed_password)
        .bind(name)
        .bind((!school.is_empty()).then(|| school.to_string()))
        .bind(&code)
        .execute(&mut *tx)
        .await?;

        created += 1;
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "created": created,
        "skipped": skipped,
    })))
}

/// DTO for updating a teacher. Fields are optional; `lifetime` clears the
/// expiration date.
#[derive(Debug, Deserialize)]
pub struct UpdateTeacherRequest {
    pub name: Option<String>,
    pub school: Option<String>,
    pub teacher_code: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub lifetime: bool,
}

/// Updates teacher account information.
/// Admin only.
pub async fn update_teacher(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTeacherRequest>,
) -> Result<impl IntoResponse, AppError> {
    let _exists: i64 = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 AND role = 'teacher'")
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Teacher not found".to_string()))?;

    if let Some(new_name) = payload.name {
        sqlx::query("UPDATE users SET name = $1 WHERE id = $2")
            .bind(new_name)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(new_school) = payload.school {
        sqlx::query("UPDATE users SET school = $1 WHERE id = $2")
            .bind(new_school)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(raw_code) = payload.teacher_code {
        let code = normalize_teacher_code(&raw_code)?;
        sqlx::query("UPDATE users SET teacher_code = $1 WHERE id = $2")
            .bind(code)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
                    AppError::Conflict("Teacher code already in use".to_string())
                } else {
                    AppError::InternalServerError(e.to_string())
                }
            })?;
    }

    if payload.lifetime {
        sqlx::query("UPDATE users SET expires_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    } else if let Some(expires_at) = payload.expires_at {
        sqlx::query("UPDATE users SET expires_at = $1 WHERE id = $2")
            .bind(expires_at)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 4, max = 128))]
    pub password: String,
}

/// Sets a new password on a teacher account. Replaces the hosted provider's
/// reset-email flow: the admin hands the new password to the teacher.
pub async fn reset_teacher_password(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;

    let updated = sqlx::query("UPDATE users SET password = $1 WHERE id = $2 AND role = 'teacher'")
        .bind(&hashed_password)
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Teacher not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Deletes a teacher account and everything it owns: quizzes, classes,
/// students and results go with it via FK cascades.
/// Admin only.
pub async fn delete_teacher(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1 AND role = 'teacher'")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete teacher {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Teacher not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}
