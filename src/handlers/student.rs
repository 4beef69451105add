// src/handlers/student.rs

use axum::{Json, extract::{Extension, State}, response::IntoResponse};
use serde::Serialize;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{quiz::Quiz, quiz_result::QuizResult, student::Student},
    utils::jwt::Claims,
};

pub async fn load_student(pool: &PgPool, id: i64) -> Result<Student, AppError> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::AuthError("Student account not found".to_string()))
}

/// One assigned quiz as shown on the student dashboard.
#[derive(Debug, Serialize)]
pub struct AssignedQuizView {
    pub id: i64,
    pub title: String,
    pub question_count: usize,
    pub time_limit: i32,
    pub max_score: f64,
    pub shuffle_questions: bool,
    pub allow_retake: bool,
    pub attempts: i64,
    /// True while the class schedule keeps the quiz closed.
    pub locked: bool,
    /// Opening time (epoch milliseconds) when a schedule exists.
    pub opens_at: Option<i64>,
    pub can_take: bool,
}

/// Lists the quizzes assigned to the student's class, with schedule locks
/// and attempt counts resolved.
pub async fn assigned_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student = load_student(&pool, claims.account_id()?).await?;

    let quizzes = sqlx::query_as::<_, Quiz>(
        "SELECT * FROM quizzes WHERE teacher_id = $1 ORDER BY created_at DESC",
    )
    .bind(student.teacher_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list assigned quizzes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut views = Vec::new();

    for quiz in quizzes {
        if !quiz.assigned_class_ids.contains(&student.class_id) {
            continue;
        }

        let attempts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM quiz_results WHERE quiz_id = $1 AND student_id = $2",
        )
        .bind(quiz.id)
        .bind(student.id)
        .fetch_one(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let opens_at = quiz.schedule_for(student.class_id);
        let locked = opens_at.is_some_and(|t| t > now_ms);
        let can_take = !locked && (quiz.allow_retake || attempts == 0);

        views.push(AssignedQuizView {
            id: quiz.id,
            title: quiz.title,
            question_count: quiz.questions.len(),
            time_limit: quiz.time_limit,
            max_score: quiz.max_score,
            shuffle_questions: quiz.shuffle_questions,
            allow_retake: quiz.allow_retake,
            attempts,
            locked,
            opens_at,
            can_take,
        });
    }

    Ok(Json(views))
}

/// The student's own submission history, newest first.
pub async fn my_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let results = sqlx::query_as::<_, QuizResult>(
        "SELECT * FROM quiz_results WHERE student_id = $1 ORDER BY submitted_at DESC",
    )
    .bind(claims.account_id()?)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(results))
}
