// src/models/quiz.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;
use validator::Validate;

use crate::config::OPTIONS_PER_QUESTION;

/// A single multiple-choice question, stored inside the quiz's JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Question {
    pub id: Uuid,

    /// Question text; may embed LaTeX wrapped in `$...$`.
    pub text: String,

    /// Optional illustration: a data URI or an http(s) URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Exactly four option strings, in authored order.
    pub options: Vec<String>,

    /// Index of the correct option, 0-3.
    pub correct_index: usize,
}

/// Represents the 'quizzes' table.
/// The question list lives in a JSONB column; a session snapshots it whole.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub teacher_id: i64,
    pub title: String,

    pub questions: Json<Vec<Question>>,

    /// Minutes. 0 = unlimited.
    pub time_limit: i32,

    /// Grading scale, e.g. 10.
    pub max_score: f64,

    /// True: reachable by guests via the teacher code.
    pub is_public: bool,

    /// Optional uppercase suffix appended to the teacher code for
    /// restricted guest access.
    pub access_code: Option<String>,

    /// False = a single attempt per enrolled student.
    pub allow_retake: bool,

    /// Shuffle question and option order per session.
    pub shuffle_questions: bool,

    /// Classes allowed to take this quiz.
    pub assigned_class_ids: Json<Vec<i64>>,

    /// class id -> opening timestamp (epoch milliseconds).
    /// A class with an entry in the future cannot start the quiz yet.
    pub class_schedules: Json<HashMap<i64, i64>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    /// Opening time for the given class, if one is scheduled.
    pub fn schedule_for(&self, class_id: i64) -> Option<i64> {
        self.class_schedules.get(&class_id).copied()
    }
}

/// DTO for a question as authored by the teacher. The server assigns ids.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct QuestionInput {
    /// Present when editing an existing question, absent for new ones.
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
    pub image: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_index: usize,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTIONS_PER_QUESTION {
        return Err(validator::ValidationError::new("exactly_four_options_required"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 2000 {
            return Err(validator::ValidationError::new("option_length_invalid"));
        }
    }
    Ok(())
}

/// DTO for creating or replacing a quiz.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct SaveQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(nested, length(min = 1, max = 200))]
    pub questions: Vec<QuestionInput>,

    /// Minutes. 0 = unlimited.
    #[validate(range(min = 0, max = 600))]
    #[serde(default)]
    pub time_limit: i32,

    #[validate(range(min = 1.0, max = 1000.0))]
    pub max_score: Option<f64>,

    #[serde(default)]
    pub is_public: bool,

    #[validate(length(max = 10))]
    pub access_code: Option<String>,

    #[serde(default = "default_true")]
    pub allow_retake: bool,

    #[serde(default)]
    pub shuffle_questions: bool,

    #[serde(default)]
    pub assigned_class_ids: Vec<i64>,

    #[serde(default)]
    pub class_schedules: HashMap<i64, i64>,
}

fn default_true() -> bool {
    true
}

/// Compact listing row for dashboards; omits the question bodies.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub question_count: usize,
    pub time_limit: i32,
    pub max_score: f64,
    pub is_public: bool,
    pub access_code: Option<String>,
    pub allow_retake: bool,
    pub shuffle_questions: bool,
    pub assigned_class_ids: Vec<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Quiz> for QuizSummary {
    fn from(q: Quiz) -> Self {
        Self {
            id: q.id,
            title: q.title,
            question_count: q.questions.len(),
            time_limit: q.time_limit,
            max_score: q.max_score,
            is_public: q.is_public,
            access_code: q.access_code,
            allow_retake: q.allow_retake,
            shuffle_questions: q.shuffle_questions,
            assigned_class_ids: q.assigned_class_ids.0,
            created_at: q.created_at,
        }
    }
}
