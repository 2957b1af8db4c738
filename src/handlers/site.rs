//! Public site endpoints: effective SEO, quote estimates, contact intake, and the caller profile.

use crate::audit::{self, AuditEntry};
use crate::auth::{rbac::role_permissions, AuthUser};
use crate::contact::{self, ContactRequest};
use crate::error::AppError;
use crate::quote::{self, QuoteRequest};
use crate::response::{success_one, success_one_ok};
use crate::seo;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Typed body from raw JSON; shape errors are the client's (400).
pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct SeoQuery {
    pub path: Option<String>,
}

pub async fn effective_seo(State(state): State<AppState>, Query(q): Query<SeoQuery>) -> Result<impl IntoResponse, AppError> {
    let path = q.path.as_deref().unwrap_or("/");
    let seo = seo::effective_for_path(&state.pool, &state.settings.cms_schema, path).await?;
    Ok(success_one_ok(seo))
}

pub async fn quote(Json(body): Json<Value>) -> Result<impl IntoResponse, AppError> {
    let request: QuoteRequest = parse_body(body)?;
    let input = request.validate()?;
    let estimate = quote::calculate(&input);
    tracing::debug!(
        building_type = %estimate.building_type,
        region = %estimate.region,
        sqft = estimate.recommended_square_feet,
        "quote calculated"
    );
    Ok(success_one_ok(estimate))
}

#[derive(Serialize)]
struct Created {
    id: uuid::Uuid,
}

pub async fn submit_contact(State(state): State<AppState>, Json(body): Json<Value>) -> Result<impl IntoResponse, AppError> {
    let request: ContactRequest = parse_body(body)?;
    let submission = request.validate()?;
    let id = contact::create(&state.pool, &state.settings.cms_schema, &submission).await?;
    tracing::info!(submission_id = %id, source_page = ?submission.source_page, "contact submission stored");
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_CREATE, "contact-submissions").resource_id(id),
    );
    Ok(success_one(Created { id }))
}

#[derive(Serialize)]
struct Profile<'a> {
    id: &'a str,
    email: Option<&'a str>,
    role: crate::auth::Role,
    permissions: &'static [&'static str],
}

pub async fn me(user: AuthUser) -> impl IntoResponse {
    success_one_ok(Profile {
        id: &user.user_id,
        email: user.email.as_deref(),
        role: user.role,
        permissions: role_permissions(user.role),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_bodies_are_bad_requests() {
        let err = parse_body::<QuoteRequest>(json!({"building_type": "office", "rental_months": "six"})).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(parse_body::<QuoteRequest>(json!({"building_type": "office", "rental_months": 6})).is_ok());
    }
}
