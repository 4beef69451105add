// src/models/class_room.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'classes' table: a group of students owned by one teacher.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClassRoom {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    /// e.g. "2025-2026".
    pub school_year: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 20))]
    pub school_year: Option<String>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}
