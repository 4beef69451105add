// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the account id (users.id or students.id, as string).
    pub sub: String,
    /// 'admin', 'teacher' or 'student'.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn account_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError("Malformed token subject".to_string()))
    }
}

/// Signs a new JWT for an account.
pub fn sign_jwt(
    id: i64,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Extracts a bearer token from request headers, if any.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects `Claims`
/// into the request extensions for handlers to use.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    match verify_jwt(token, &state.config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: Admin Authorization.
/// Must be used AFTER `auth_middleware`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_role(&req, "admin")?;
    Ok(next.run(req).await)
}

/// Axum Middleware: Teacher Authorization.
/// The admin passes too (the original exposed an "admin mode" over
/// teacher data).
pub async fn teacher_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let claims = claims_of(&req)?;
    if claims.role != "teacher" && claims.role != "admin" {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}

/// Axum Middleware: Student Authorization.
pub async fn student_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_role(&req, "student")?;
    Ok(next.run(req).await)
}

fn claims_of(req: &Request<Body>) -> Result<&Claims, StatusCode> {
    req.extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn require_role(req: &Request<Body>, role: &str) -> Result<(), StatusCode> {
    if claims_of(req)?.role != role {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}
