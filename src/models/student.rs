// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'students' table.
/// A student belongs to exactly one class of one teacher.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub teacher_id: i64,
    pub class_id: i64,

    /// Unique login id (not an email).
    pub username: String,

    /// Argon2 password hash.
    #[serde(skip)]
    pub password: String,

    pub full_name: String,

    /// Sequence number within the class roster.
    pub seq_no: Option<i32>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateStudentRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 4, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(range(min = 1, max = 999))]
    pub seq_no: Option<i32>,
}

/// DTO for updating a student. Fields are optional; a present password is
/// re-hashed before storage.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStudentRequest {
    pub full_name: Option<String>,
    pub password: Option<String>,
    pub seq_no: Option<i32>,
    pub class_id: Option<i64>,
}

/// DTO for student login.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct StudentLoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Bulk roster import: one student per line, "full name, username, password"
/// with an optional leading sequence number.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct ImportStudentsRequest {
    #[validate(length(min = 1, max = 100_000))]
    pub lines: String,
}
