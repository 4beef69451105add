// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table: the admin account and teacher accounts.
///
/// Teachers come in two kinds: 'email' accounts sign in with their email
/// address, 'simple' accounts with a plain username handed out by the admin.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// 'admin' or 'teacher'.
    pub role: String,

    /// 'email' or 'simple'.
    pub account_kind: String,

    pub email: Option<String>,
    pub username: Option<String>,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub name: String,
    pub school: Option<String>,

    /// Uppercase code students use to reach this teacher's public quizzes.
    /// NULL for the admin account.
    pub teacher_code: Option<String>,

    /// Account expiry. NULL = lifetime access.
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl User {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_some_and(|t| now > t)
    }
}

/// DTO for teacher/admin login. `identifier` is an email or a username.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 100))]
    pub identifier: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Public view of a teacher account, as listed in the admin panel.
#[derive(Debug, Serialize)]
pub struct TeacherView {
    pub id: i64,
    pub account_kind: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub name: String,
    pub school: Option<String>,
    pub teacher_code: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub expired: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TeacherView {
    pub fn from_user(u: User, now: chrono::DateTime<chrono::Utc>) -> Self {
        let expired = u.is_expired(now);
        Self {
            id: u.id,
            account_kind: u.account_kind,
            email: u.email,
            username: u.username,
            name: u.name,
            school: u.school,
            teacher_code: u.teacher_code.unwrap_or_default(),
            expires_at: u.expires_at,
            expired,
            created_at: u.created_at,
        }
    }
}
