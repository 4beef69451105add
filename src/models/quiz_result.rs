// src/models/quiz_result.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;

/// Position breakdown of a submission, 1-based in presented order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailStats {
    pub correct: Vec<usize>,
    pub wrong: Vec<usize>,
    pub skipped: Vec<usize>,
}

/// Represents the 'quiz_results' table.
///
/// A result is a self-contained snapshot written exactly once per completed
/// enrolled session and never mutated. `question_order` plus `user_answers`
/// are sufficient to replay the exact on-screen experience later, even if
/// the teacher edits the quiz in the meantime.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub student_id: i64,
    pub student_name: String,
    pub class_id: i64,

    /// Final scaled score, 0..max_score.
    pub score: f64,
    pub max_score: f64,
    pub correct_count: i32,
    pub total_questions: i32,

    pub submitted_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Human-readable transcript, "1.A, 2.B, 3._" in presented order.
    pub answer_history: String,

    /// 3-digit variant code when the presentation was shuffled,
    /// the sentinel "original" otherwise.
    pub quiz_variant: String,

    /// Question ids in the exact order the student saw them.
    pub question_order: Json<Vec<Uuid>>,

    /// question id -> selected option index (within the presented order).
    pub user_answers: Json<HashMap<Uuid, usize>>,

    pub detail_stats: Json<DetailStats>,
}
