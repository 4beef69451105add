// src/handlers/quizzes.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use sqlx::types::Json as Jsonb;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::DEFAULT_MAX_SCORE,
    error::AppError,
    models::quiz::{Question, QuestionInput, Quiz, QuizSummary, SaveQuizRequest},
    utils::{html::clean_html, jwt::Claims},
};

/// Lists the teacher's quizzes as compact summaries, newest first.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.account_id()?;

    let quizzes = sqlx::query_as::<_, Quiz>(
        "SELECT * FROM quizzes WHERE teacher_id = $1 ORDER BY created_at DESC",
    )
    .bind(teacher_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list quizzes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let summaries: Vec<QuizSummary> = quizzes.into_iter().map(QuizSummary::from).collect();
    Ok(Json(summaries))
}

/// Fetches one quiz with full question bodies (for the editor and preview).
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_owned_quiz(&pool, id, claims.account_id()?).await?;
    Ok(Json(quiz))
}

/// Creates a quiz from the authoring payload.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SaveQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let teacher_id = claims.account_id()?;

    let questions = build_questions(payload.questions)?;
    let access_code = normalize_access_code(payload.access_code);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes
            (teacher_id, title, questions, time_limit, max_score, is_public,
             access_code, allow_retake, shuffle_questions, assigned_class_ids,
             class_schedules)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(teacher_id)
    .bind(payload.title.trim())
    .bind(Jsonb(&questions))
    .bind(payload.time_limit)
    .bind(payload.max_score.unwrap_or(DEFAULT_MAX_SCORE))
    .bind(payload.is_public)
    .bind(&access_code)
    .bind(payload.allow_retake)
    .bind(payload.shuffle_questions)
    .bind(Jsonb(&payload.assigned_class_ids))
    .bind(Jsonb(&payload.class_schedules))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Replaces a quiz wholesale. Question ids present in the payload survive,
/// so existing results keep pointing at the right questions.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let teacher_id = claims.account_id()?;
    let _quiz = fetch_owned_quiz(&pool, id, teacher_id).await?;

    let questions = build_questions(payload.questions)?;
    let access_code = normalize_access_code(payload.access_code);

    sqlx::query(
        r#"
        UPDATE quizzes SET
            title = $1, questions = $2, time_limit = $3, max_score = $4,
            is_public = $5, access_code = $6, allow_retake = $7,
            shuffle_questions = $8, assigned_class_ids = $9, class_schedules = $10
        WHERE id = $11
        "#,
    )
    .bind(payload.title.trim())
    .bind(Jsonb(&questions))
    .bind(payload.time_limit)
    .bind(payload.max_score.unwrap_or(DEFAULT_MAX_SCORE))
    .bind(payload.is_public)
    .bind(&access_code)
    .bind(payload.allow_retake)
    .bind(payload.shuffle_questions)
    .bind(Jsonb(&payload.assigned_class_ids))
    .bind(Jsonb(&payload.class_schedules))
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update quiz {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// Deletes a quiz. Results are snapshots and deliberately survive.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.account_id()?;
    let _quiz = fetch_owned_quiz(&pool, id, teacher_id).await?;

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Loads a quiz and checks it belongs to the calling teacher.
pub async fn fetch_owned_quiz(pool: &PgPool, id: i64, teacher_id: i64) -> Result<Quiz, AppError> {
    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    if quiz.teacher_id != teacher_id {
        return Err(AppError::Forbidden("Not your quiz".to_string()));
    }
    Ok(quiz)
}

/// Turns authoring inputs into stored questions: sanitizes markup, checks
/// images, and assigns ids to new questions.
fn build_questions(inputs: Vec<QuestionInput>) -> Result<Vec<Question>, AppError> {
    inputs
        .into_iter()
        .map(|input| {
            if let Some(image) = &input.image {
                validate_image(image)?;
            }
            Ok(Question {
                id: input.id.unwrap_or_else(Uuid::new_v4),
                text: clean_html(&input.text),
                image: input.image,
                options: input.options.iter().map(|o| clean_html(o)).collect(),
                correct_index: input.correct_index,
            })
        })
        .collect()
}

/// Accepts inline data URIs or http(s) URLs; anything else is refused.
fn validate_image(image: &str) -> Result<(), AppError> {
    if image.starts_with("data:image/") {
        return Ok(());
    }
    let url = Url::parse(image)
        .map_err(|_| AppError::BadRequest("Question image must be a data URI or URL".to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::BadRequest(
            "Question image URL must use http or https".to_string(),
        ));
    }
    Ok(())
}

fn normalize_access_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_questions_assigns_ids_and_sanitizes() {
        let input = QuestionInput {
            id: None,
            text: "Solve <script>alert(1)</script> $x^2 = 4$".to_string(),
            image: None,
            options: vec!["2".into(), "-2".into(), "both".into(), "neither".into()],
            correct_index: 2,
        };
        let questions = build_questions(vec![input]).unwrap();
        assert!(!questions[0].text.contains("script"));
        assert!(questions[0].text.contains("$x^2 = 4$"));
        assert_eq!(questions[0].correct_index, 2);
    }

    #[test]
    fn build_questions_keeps_existing_ids() {
        let id = Uuid::new_v4();
        let input = QuestionInput {
            id: Some(id),
            text: "kept".to_string(),
            image: None,
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 0,
        };
        assert_eq!(build_questions(vec![input]).unwrap()[0].id, id);
    }

    #[test]
    fn image_validation() {
        assert!(validate_image("data:image/png;base64,AAAA").is_ok());
        assert!(validate_image("https://example.com/fig.png").is_ok());
        assert!(validate_image("ftp://example.com/fig.png").is_err());
        assert!(validate_image("not a url").is_err());
    }

    #[test]
    fn access_codes_are_uppercased_and_empty_means_none() {
        assert_eq!(normalize_access_code(Some(" ab1 ".into())), Some("AB1".into()));
        assert_eq!(normalize_access_code(Some("  ".into())), None);
        assert_eq!(normalize_access_code(None), None);
    }
}
