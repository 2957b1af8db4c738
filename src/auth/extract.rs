//! Extract the caller from a `Bearer` access token.

use crate::auth::jwt::validate_token;
use crate::auth::rbac::Role;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Authenticated caller. Rejects with 401 when the header is missing or the token is invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Caller who may be anonymous. A present-but-invalid token is still a 401.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into()))
}

fn user_from_token(token: &str, state: &AppState) -> Result<AuthUser, AppError> {
    let claims = validate_token(token, &state.settings.jwt).map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;
    let role = claims.role();
    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        role,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
        user_from_token(token, state)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(MaybeAuthUser(Some(user_from_token(token, state)?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
