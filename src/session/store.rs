// src/session/store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::quiz_result::DetailStats;

/// The enrolled test-taker a live session is graded for. Guests have none.
#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub id: i64,
    pub name: String,
    pub class_id: i64,
}

/// Everything needed to insert one quiz_results row. Built by the engine at
/// finalization; the caller decides where (and whether) it is written.
#[derive(Debug, Clone)]
pub struct ResultDraft {
    pub quiz_id: i64,
    pub quiz_title: String,
    pub student_id: i64,
    pub student_name: String,
    pub class_id: i64,
    pub score: f64,
    pub max_score: f64,
    pub correct_count: i32,
    pub total_questions: i32,
    pub answer_history: String,
    pub quiz_variant: String,
    pub question_order: Vec<Uuid>,
    pub user_answers: HashMap<Uuid, usize>,
    pub detail_stats: DetailStats,
}

/// Narrow persistence seam for finished sessions.
///
/// The registry only ever writes results, so the engine and its timers stay
/// testable against an in-memory implementation.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_result(&self, draft: &ResultDraft) -> Result<i64, sqlx::Error>;
}

pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn save_result(&self, draft: &ResultDraft) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quiz_results
                (quiz_id, quiz_title, student_id, student_name, class_id,
                 score, max_score, correct_count, total_questions,
                 answer_history, quiz_variant, question_order, user_answers,
                 detail_stats)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(draft.quiz_id)
        .bind(&draft.quiz_title)
        .bind(draft.student_id)
        .bind(&draft.student_name)
        .bind(draft.class_id)
        .bind(draft.score)
        .bind(draft.max_score)
        .bind(draft.correct_count)
        .bind(draft.total_questions)
        .bind(&draft.answer_history)
        .bind(&draft.quiz_variant)
        .bind(Json(&draft.question_order))
        .bind(Json(&draft.user_answers))
        .bind(Json(&draft.detail_stats))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
