// src/handlers/results.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{quiz_result::QuizResult, student::Student},
    utils::{csv_export, jwt::Claims},
};

use super::classes::fetch_owned_class;

#[derive(Debug, Deserialize)]
pub struct ResultFilter {
    pub class_id: Option<i64>,
    pub quiz_id: Option<i64>,
}

/// Lists results across the teacher's classes, optionally narrowed to one
/// class and/or one quiz, newest first.
pub async fn list_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<ResultFilter>,
) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, QuizResult>(
        r#"
        SELECT r.* FROM quiz_results r
        JOIN classes c ON c.id = r.class_id
        WHERE c.teacher_id = $1
          AND ($2::BIGINT IS NULL OR r.class_id = $2)
          AND ($3::BIGINT IS NULL OR r.quiz_id = $3)
        ORDER BY r.submitted_at DESC
        "#,
    )
    .bind(claims.account_id()?)
    .bind(filter.class_id)
    .bind(filter.quiz_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(results))
}

/// Deletes one result (e.g. an invalidated attempt before a retake).
pub async fn delete_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM quiz_results r
        USING classes c
        WHERE r.id = $1 AND c.id = r.class_id AND c.teacher_id = $2
        "#,
    )
    .bind(id)
    .bind(claims.account_id()?)
    .execute(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("Result not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Wipes every result of one quiz across the teacher's classes.
pub async fn delete_results_for_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM quiz_results r
        USING classes c
        WHERE r.quiz_id = $1 AND c.id = r.class_id AND c.teacher_id = $2
        "#,
    )
    .bind(quiz_id)
    .bind(claims.account_id()?)
    .execute(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "deleted": deleted.rows_affected() })))
}

#[derive(Debug, Deserialize)]
pub struct GradebookFilter {
    pub class_id: i64,
}

/// Gradebook CSV for one class: one row per student, one column per quiz
/// that class has results for, best score kept when a student retook.
pub async fn export_gradebook(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<GradebookFilter>,
) -> Result<impl IntoResponse, AppError> {
    let class = fetch_owned_class(&pool, filter.class_id, claims.account_id()?).await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT * FROM students WHERE class_id = $1 ORDER BY seq_no NULLS LAST, full_name",
    )
    .bind(class.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let results = sqlx::query_as::<_, QuizResult>(
        "SELECT * FROM quiz_results WHERE class_id = $1 ORDER BY submitted_at",
    )
    .bind(class.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    // Column per quiz seen in the results, in first-seen order.
    let mut quiz_columns: Vec<(i64, String)> = Vec::new();
    for r in &results {
        if !quiz_columns.iter().any(|(id, _)| *id == r.quiz_id) {
            quiz_columns.push((r.quiz_id, r.quiz_title.clone()));
        }
    }

    // Best score per (student, quiz).
    let mut best: HashMap<(i64, i64), f64> = HashMap::new();
    for r in &results {
        let entry = best.entry((r.student_id, r.quiz_id)).or_insert(r.score);
        if r.score > *entry {
            *entry = r.score;
        }
    }

    let mut headers: Vec<String> =
        vec!["No".to_string(), "Full name".to_string(), "Username".to_string()];
    headers.extend(quiz_columns.iter().map(|(_, title)| title.clone()));

    let rows: Vec<Vec<String>> = students
        .iter()
        .map(|s| {
            let mut row = vec![
                s.seq_no.map(|n| n.to_string()).unwrap_or_default(),
                s.full_name.clone(),
                s.username.clone(),
            ];
            for (quiz_id, _) in &quiz_columns {
                row.push(
                    best.get(&(s.id, *quiz_id))
                        .map(|score| format!("{:.2}", score))
                        .unwrap_or_default(),
                );
            }
            row
        })
        .collect();

    let body = csv_export::write_rows(&headers, &rows)?;
    let filename = format!("attachment; filename=\"gradebook_class_{}.csv\"", class.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    ))
}
