// src/handlers/classes.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        class_room::{ClassRoom, CreateClassRequest, UpdateClassRequest},
        student::{CreateStudentRequest, ImportStudentsRequest, Student, UpdateStudentRequest},
    },
    utils::{csv_export, hash::hash_password, jwt::Claims},
};

/// Loads a class and checks it belongs to the calling teacher.
pub async fn fetch_owned_class(
    pool: &PgPool,
    id: i64,
    teacher_id: i64,
) -> Result<ClassRoom, AppError> {
    let class = sqlx::query_as::<_, ClassRoom>("SELECT * FROM classes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Class not found".to_string()))?;

    if class.teacher_id != teacher_id {
        return Err(AppError::Forbidden("Not your class".to_string()));
    }
    Ok(class)
}

pub async fn list_classes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes = sqlx::query_as::<_, ClassRoom>(
        "SELECT * FROM classes WHERE teacher_id = $1 ORDER BY name",
    )
    .bind(claims.account_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list classes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(classes))
}

pub async fn create_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO classes (teacher_id, name, school_year) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(claims.account_id()?)
    .bind(payload.name.trim())
    .bind(&payload.school_year)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create class: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn update_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let _class = fetch_owned_class(&pool, id, claims.account_id()?).await?;

    sqlx::query("UPDATE classes SET name = $1 WHERE id = $2")
        .bind(payload.name.trim())
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Deletes a class; its students and their results cascade away.
pub async fn delete_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _class = fetch_owned_class(&pool, id, claims.account_id()?).await?;

    sqlx::query("DELETE FROM classes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn list_students(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _class = fetch_owned_class(&pool, class_id, claims.account_id()?).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 ORDER BY seq_no NULLS LAST, full_name",
    )
    .bind(class_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(students))
}

pub async fn create_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let teacher_id = claims.account_id()?;
    let _class = fetch_owned_class(&pool, class_id, teacher_id).await?;

    let hashed_password = hash_password(&payload.password)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO students (teacher_id, class_id, username, password, full_name, seq_no)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(teacher_id)
    .bind(class_id)
    .bind(payload.username.trim())
    .bind(&hashed_password)
    .bind(payload.full_name.trim())
    .bind(payload.seq_no)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Username '{}' already exists", payload.username))
        } else {
            tracing::error!("Failed to create student: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Bulk roster import from pasted lines, committed as one transaction.
/// Line format: "full name, username, password" with an optional leading
/// sequence number. Bad lines are skipped and reported.
pub async fn import_students(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
    Json(payload): Json<ImportStudentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let teacher_id = claims.account_id()?;
    let _class = fetch_owned_class(&pool, class_id, teacher_id).await?;

    let mut created = 0usize;
    let mut skipped: Vec<String> = Vec::new();

    let mut tx = pool.begin().await?;

    for (line_no, line) in payload.lines.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split([',', '\t']).map(str::trim).collect();
        let (seq_no, full_name, username, password) = match fields.as_slice() {
            [name, user, pass] => (None, *name, *user, *pass),
            [seq, name, user, pass] => match seq.parse::<i32>() {
                Ok(n) => (Some(n), *name, *user, *pass),
                Err(_) => {
                    skipped.push(format!("line {}: bad sequence number", line_no + 1));
                    continue;
                }
            },
            _ => {
                skipped.push(format!("line {}: expected 3 or 4 fields", line_no + 1));
                continue;
            }
        };

        if full_name.is_empty() || username.len() < 3 || password.len() < 4 {
            skipped.push(format!("line {}: bad name/username/password", line_no + 1));
            continue;
        }

        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE username = $1)")
                .bind(username)
                .fetch_one(&mut *tx)
                .await?;
        if taken {
            skipped.push(format!("line {}: username '{}' already exists", line_no + 1, username));
            continue;
        }

        let hashed_password = hash_password(password)?;
        sqlx::query(
            r#"
            INSERT INTO students (teacher_id, class_id, username, password, full_name, seq_no)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(teacher_id)
        .bind(class_id)
        .bind(username)
        .bind(&hashed_password)
        .bind(full_name)
        .bind(seq_no)
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

pub async fn update_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.account_id()?;
    let student = fetch_owned_student(&pool, id, teacher_id).await?;

    if let Some(full_name) = payload.full_name {
        sqlx::query("UPDATE students SET full_name = $1 WHERE id = $2")
            .bind(full_name.trim())
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(password) = payload.password {
        if password.len() < 4 {
            return Err(AppError::BadRequest("Password too short".to_string()));
        }
        let hashed_password = hash_password(&password)?;
        sqlx::query("UPDATE students SET password = $1 WHERE id = $2")
            .bind(&hashed_password)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    if let Some(seq_no) = payload.seq_no {
        sqlx::query("UPDATE students SET seq_no = $1 WHERE id = $2")
            .bind(seq_no)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    // Moving between classes stays within the same teacher.
    if let Some(class_id) = payload.class_id {
        if class_id != student.class_id {
            let _target = fetch_owned_class(&pool, class_id, teacher_id).await?;
            sqlx::query("UPDATE students SET class_id = $1 WHERE id = $2")
                .bind(class_id)
                .bind(id)
                .execute(&pool)
                .await
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        }
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Deletes one student; their results cascade away.
pub async fn delete_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _student = fetch_owned_student(&pool, id, claims.account_id()?).await?;

    sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Empties a class roster (students and their results) but keeps the class.
pub async fn clear_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _class = fetch_owned_class(&pool, class_id, claims.account_id()?).await?;

    let deleted = sqlx::query("DELETE FROM students WHERE class_id = $1")
        .bind(class_id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "deleted": deleted.rows_affected() })))
}

/// Roster CSV download: sequence number, full name, username.
pub async fn export_roster(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let class = fetch_owned_class(&pool, class_id, claims.account_id()?).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 ORDER BY seq_no NULLS LAST, full_name",
    )
    .bind(class_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|s| {
            vec![
                s.seq_no.map(|n| n.to_string()).unwrap_or_default(),
                s.full_name.clone(),
                s.username.clone(),
            ]
        })
        .collect();

    let body = csv_export::write_rows(&["No", "Full name", "Username"], &rows)?;
    let filename = format!("attachment; filename=\"class_{}.csv\"", class.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    ))
}

async fn fetch_owned_student(pool: &PgPool, id: i64, teacher_id: i64) -> Result<Student, AppError> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Student not found".to_string()))?;

    if student.teacher_id != teacher_id {
        return Err(AppError::Forbidden("Not your student".to_string()));
    }
    Ok(student)
}
