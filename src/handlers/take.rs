// src/handlers/take.rs
//
// The HTTP surface of the quiz session engine: guest entry, session
// lifecycle (start / select / submit / abandon) and review reconstruction.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json as Jsonb;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        quiz::{Quiz, QuizSummary},
        quiz_result::QuizResult,
        student::Student,
        user::User,
    },
    session::{
        engine::{FeedbackPolicy, QuizSession, Scorecard, SelectOutcome, SessionState},
        registry::SubmitOutput,
        store::StudentIdentity,
    },
    state::AppState,
    utils::jwt::{Claims, bearer_token, verify_jwt},
};

use super::student::load_student;

fn optional_claims(headers: &HeaderMap, config: &Config) -> Option<Claims> {
    bearer_token(headers).and_then(|t| verify_jwt(t, &config.jwt_secret).ok())
}

fn required_claims(headers: &HeaderMap, config: &Config) -> Result<Claims, AppError> {
    optional_claims(headers, config)
        .ok_or(AppError::AuthError("Missing or invalid token".to_string()))
}

// ---------------------------------------------------------------------------
// Guest entry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct GuestLookupRequest {
    #[validate(length(min = 3, max = 30))]
    pub code: String,
}

/// Resolves a guest's entry code to a teacher and their public quizzes.
///
/// An exact teacher-code match lists the public quizzes without access
/// codes. Otherwise the input is treated as teacher code + access-code
/// suffix, listing only the quizzes whose access code equals the suffix.
pub async fn guest_lookup(
    State(pool): State<PgPool>,
    Json(payload): Json<GuestLookupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let input = payload.code.trim().to_uppercase();

    let exact = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE teacher_code = $1 AND role = 'teacher'",
    )
    .bind(&input)
    .fetch_optional(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let (teacher, suffix) = match exact {
        Some(t) => (t, String::new()),
        None => {
            let teachers =
                sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = 'teacher'")
                    .fetch_all(&pool)
                    .await
                    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

            teachers
                .into_iter()
                .find_map(|t| {
                    let code = t.teacher_code.clone()?;
                    let sfx = input.strip_prefix(code.as_str())?;
                    (!sfx.is_empty()).then(|| (t, sfx.to_string()))
                })
                .ok_or(AppError::NotFound("No teacher with this code".to_string()))?
        }
    };

    let quizzes = sqlx::query_as::<_, Quiz>(
        "SELECT * FROM quizzes WHERE teacher_id = $1 AND is_public = TRUE ORDER BY created_at DESC",
    )
    .bind(teacher.id)
    .fetch_all(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let listed: Vec<QuizSummary> = quizzes
        .into_iter()
        .filter(|q| {
            let quiz_code = q.access_code.as_deref().unwrap_or("");
            if suffix.is_empty() {
                quiz_code.is_empty()
            } else {
                quiz_code == suffix
            }
        })
        .map(QuizSummary::from)
        .collect();

    Ok(Json(serde_json::json!({
        "teacher": {
            "name": teacher.name,
            "school": teacher.school,
            "teacher_code": teacher.teacher_code,
        },
        "quizzes": listed,
    })))
}

// ---------------------------------------------------------------------------
// Session views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct TakeQuestionView {
    pub id: Uuid,
    pub position: usize,
    pub text: String,
    pub image: Option<String>,
    pub options: Vec<String>,
    /// False only for review placeholders of deleted questions.
    pub available: bool,
    pub selected: Option<usize>,
    /// Per-question correctness, once this session reveals it.
    pub correct: Option<bool>,
    /// The correct option index, once this session reveals it.
    pub correct_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    /// Absent in review mode, which is stateless.
    pub token: Option<String>,
    pub state: SessionState,
    pub policy: FeedbackPolicy,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub max_score: f64,
    pub variant: Option<String>,
    pub remaining_seconds: Option<u64>,
    pub answered_count: usize,
    pub total_questions: usize,
    pub live_correct_count: Option<usize>,
    pub live_score: Option<f64>,
    pub questions: Vec<TakeQuestionView>,
    pub scorecard: Option<Scorecard>,
}

fn session_view(token: Option<String>, s: &QuizSession) -> SessionView {
    let finished = matches!(s.state(), SessionState::Submitted | SessionState::Review);
    let immediate = s.policy() == FeedbackPolicy::Immediate;

    let questions = s
        .presented()
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let selected = s.answers().get(&q.id).copied();
            let reveal = finished || (immediate && selected.is_some());
            TakeQuestionView {
                id: q.id,
                position: i + 1,
                text: q.text.clone(),
                image: q.image.clone(),
                options: q.options.clone(),
                available: q.available,
                selected,
                correct: if reveal { s.feedback().get(&q.id).copied() } else { None },
                correct_index: reveal.then_some(q.correct_index),
            }
        })
        .collect();

    SessionView {
        token,
        state: s.state(),
        policy: s.policy(),
        quiz_id: s.quiz_id(),
        quiz_title: s.quiz_title().to_string(),
        max_score: s.max_score(),
        variant: s.variant_code().map(|c| c.to_string()),
        remaining_seconds: s.remaining_seconds(),
        answered_count: s.answers().len(),
        total_questions: s.presented().len(),
        live_correct_count: immediate.then(|| s.live_correct_count()),
        live_score: immediate.then(|| s.live_score()),
        questions,
        scorecard: s.scorecard().cloned(),
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub quiz_id: i64,
}

/// Opens a live session.
///
/// A student token starts a deferred-feedback, persisted attempt, subject to
/// class assignment, schedule locks and the retake policy. Without a token
/// the quiz must be public and the session runs as an anonymous
/// immediate-feedback attempt. A teacher token previews any of their own
/// quizzes, guest-style, with nothing recorded.
pub async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pool = &state.pool;

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(payload.quiz_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let claims = optional_claims(&headers, &state.config);

    let (policy, taker) = match claims {
        Some(c) if c.role == "student" => {
            let student = load_student(pool, c.account_id()?).await?;
            authorize_enrolled(pool, &quiz, &student).await?;
            (
                FeedbackPolicy::Deferred,
                Some(StudentIdentity {
                    id: student.id,
                    name: student.full_name.clone(),
                    class_id: student.class_id,
                }),
            )
        }
        Some(c) if c.role == "teacher" || c.role == "admin" => {
            if quiz.teacher_id != c.account_id()? && c.role != "admin" {
                return Err(AppError::Forbidden("Not your quiz".to_string()));
            }
            (FeedbackPolicy::Immediate, None)
        }
        _ => {
            if !quiz.is_public {
                return Err(AppError::Forbidden(
                    "This quiz is not open to guests".to_string(),
                ));
            }
            (FeedbackPolicy::Immediate, None)
        }
    };

    let session = QuizSession::start(&quiz, policy)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let token = state.sessions.insert(session, taker);

    let view = state
        .sessions
        .with_session(&token, |s| session_view(Some(token.clone()), s))
        .ok_or(AppError::InternalServerError("session vanished".to_string()))?;

    Ok((StatusCode::CREATED, Json(view)))
}

async fn authorize_enrolled(pool: &PgPool, quiz: &Quiz, student: &Student) -> Result<(), AppError> {
    if quiz.teacher_id != student.teacher_id
        || !quiz.assigned_class_ids.contains(&student.class_id)
    {
        return Err(AppError::Forbidden(
            "This quiz is not assigned to your class".to_string(),
        ));
    }

    if let Some(opens_at) = quiz.schedule_for(student.class_id) {
        if opens_at > chrono::Utc::now().timestamp_millis() {
            let when = chrono::DateTime::from_timestamp_millis(opens_at)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            return Err(AppError::Forbidden(format!("This quiz opens at {}", when)));
        }
    }

    if !quiz.allow_retake {
        let attempts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM quiz_results WHERE quiz_id = $1 AND student_id = $2",
        )
        .bind(quiz.id)
        .bind(student.id)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        if attempts > 0 {
            return Err(AppError::Forbidden(
                "This quiz allows a single attempt".to_string(),
            ));
        }
    }

    Ok(())
}

pub async fn session_state(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .sessions
        .with_session(&token, |s| session_view(Some(token.clone()), s))
        .ok_or(AppError::NotFound("Session not found".to_string()))?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub question_id: Uuid,
    pub option_index: usize,
}

/// Records one selection and reports the live progress the header shows.
pub async fn select_answer(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<SelectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .sessions
        .select(&token, payload.question_id, payload.option_index)
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    let (status, correct) = match outcome {
        SelectOutcome::Recorded => ("recorded", None),
        SelectOutcome::RecordedWithFeedback { correct } => ("recorded", Some(correct)),
        SelectOutcome::Ignored => ("ignored", None),
    };

    let progress = state
        .sessions
        .with_session(&token, |s| {
            let immediate = s.policy() == FeedbackPolicy::Immediate;
            serde_json::json!({
                "status": status,
                "correct": correct,
                "answered_count": s.answers().len(),
                "total_questions": s.presented().len(),
                "live_correct_count": immediate.then(|| s.live_correct_count()),
                "live_score": immediate.then(|| s.live_score()),
            })
        })
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    Ok(Json(progress))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub force: bool,
}

/// Submits the session.
///
/// Unforced submits with unanswered questions come back as
/// `confirm_required` plus the 1-based gaps; the client either cancels or
/// re-submits with `force`. On finalization an enrolled taker's result is
/// written best-effort: a failed save is reported in `warning` but the
/// computed score stands.
pub async fn submit_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state
        .sessions
        .submit(&token, payload.force)
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    match output {
        SubmitOutput::NeedsConfirmation { unanswered } => Ok(Json(serde_json::json!({
            "status": "confirm_required",
            "unanswered": unanswered,
        }))),
        SubmitOutput::Ignored => Ok(Json(serde_json::json!({ "status": "ignored" }))),
        SubmitOutput::Finalized { scorecard, draft } => {
            let mut saved = None;
            let mut result_id = None;
            let mut warning = None;

            if let Some(draft) = draft {
                match state.sessions.persist(&draft).await {
                    Ok(id) => {
                        saved = Some(true);
                        result_id = Some(id);
                    }
                    Err(e) => {
                        tracing::error!("failed to save quiz result: {:?}", e);
                        saved = Some(false);
                        warning = Some(
                            "Could not save your result. Check your connection and tell your teacher.",
                        );
                    }
                }
            }

            Ok(Json(serde_json::json!({
                "status": "submitted",
                "scorecard": scorecard,
                "saved": saved,
                "result_id": result_id,
                "warning": warning,
            })))
        }
    }
}

/// "Go back" from the submit-confirmation prompt.
pub async fn cancel_submission(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .sessions
        .cancel_submit(&token)
        .ok_or(AppError::NotFound("Session not found".to_string()))?;
    Ok(Json(serde_json::json!({ "status": "live" })))
}

/// Drops an unfinished session (navigation away). Its timer dies with it.
pub async fn abandon_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.sessions.remove(&token) {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "removed": true })))
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Rebuilds a past attempt from its persisted result: exact presented
/// order, exact answers, read-only. Students see their own results,
/// teachers those of their classes.
pub async fn review_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(result_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let pool = &state.pool;
    let claims = required_claims(&headers, &state.config)?;

    let result = sqlx::query_as::<_, QuizResult>("SELECT * FROM quiz_results WHERE id = $1")
        .bind(result_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;

    match claims.role.as_str() {
        "student" => {
            if claims.account_id()? != result.student_id {
                return Err(AppError::Forbidden("Not your result".to_string()));
            }
        }
        "teacher" => {
            let owner: Option<i64> =
                sqlx::query_scalar("SELECT teacher_id FROM classes WHERE id = $1")
                    .bind(result.class_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| AppError::InternalServerError(e.to_string()))?;
            if owner != Some(claims.account_id()?) {
                return Err(AppError::Forbidden("Not your class".to_string()));
            }
        }
        "admin" => {}
        _ => return Err(AppError::Forbidden("Not allowed".to_string())),
    }

    let quiz = sqlx::query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = $1")
        .bind(result.quiz_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        // The quiz may be gone entirely; every recorded question then
        // renders as an unavailable placeholder.
        .unwrap_or_else(|| deleted_quiz_stub(&result));

    let session = QuizSession::review(&quiz, &result)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let view = session_view(None, &session);

    Ok(Json(serde_json::json!({
        "result_id": result.id,
        "student_id": result.student_id,
        "student_name": result.student_name,
        "class_id": result.class_id,
        "submitted_at": result.submitted_at,
        "variant": result.quiz_variant,
        "session": view,
    })))
}

fn deleted_quiz_stub(result: &QuizResult) -> Quiz {
    Quiz {
        id: result.quiz_id,
        teacher_id: 0,
        title: result.quiz_title.clone(),
        questions: Jsonb(Vec::new()),
        time_limit: 0,
        max_score: result.max_score,
        is_public: false,
        access_code: None,
        allow_retake: true,
        shuffle_questions: false,
        assigned_class_ids: Jsonb(Vec::new()),
        class_schedules: Jsonb(HashMap::new()),
        created_at: None,
    }
}
