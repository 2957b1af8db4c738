//! Admin-area endpoints: SEO management, contact follow-up, users, audit log, security metrics.

use super::site::parse_body;
use crate::audit::{self, AuditEntry, AuditLogQuery};
use crate::auth::{authorize, Action, AuthUser};
use crate::contact::{self, ContactStatus, SubmissionQuery};
use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::seo::{self, PageSeoInput, SeoDefaults};
use crate::state::AppState;
use crate::users::{self, NewUser, UserQuery, UserUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

const SEO: &str = "seo";
const CONTACT_SUBMISSIONS: &str = "contact-submissions";
const USERS: &str = "users";
const AUDIT_LOGS: &str = "audit-logs";
const SECURITY: &str = "security";

fn parse_uuid(raw: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid uuid".into()))
}

// SEO

pub async fn get_seo_defaults(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SEO, Action::Read)?;
    let d = seo::get_defaults(&state.pool, &state.settings.cms_schema).await?;
    Ok(success_one_ok(d))
}

pub async fn put_seo_defaults(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SEO, Action::Write)?;
    let defaults: SeoDefaults = parse_body(body)?;
    let saved = seo::put_defaults(&state.pool, &state.settings.cms_schema, &defaults).await?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_UPDATE, "seo-defaults")
            .actor(&user)
            .resource_id(seo::DEFAULTS_ID),
    );
    Ok(success_one_ok(saved))
}

pub async fn list_seo_pages(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SEO, Action::Read)?;
    let pages = seo::list_pages(&state.pool, &state.settings.cms_schema).await?;
    Ok(success_many(pages))
}

pub async fn put_seo_page(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SEO, Action::Write)?;
    let input: PageSeoInput = parse_body(body)?;
    let page = seo::upsert_page(&state.pool, &state.settings.cms_schema, input).await?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_UPDATE, "page-seo")
            .actor(&user)
            .resource_id(page.id)
            .details(json!({ "page_path": page.page_path })),
    );
    Ok(success_one_ok(page))
}

pub async fn delete_seo_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SEO, Action::Delete)?;
    let id = parse_uuid(&id)?;
    if !seo::delete_page(&state.pool, &state.settings.cms_schema, id).await? {
        return Err(AppError::NotFound(format!("page seo {}", id)));
    }
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_DELETE, "page-seo").actor(&user).resource_id(id),
    );
    Ok(StatusCode::NO_CONTENT)
}

// Contact submissions

pub async fn list_contact_submissions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<SubmissionQuery>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, CONTACT_SUBMISSIONS, Action::Read)?;
    let rows = contact::list(&state.pool, &state.settings.cms_schema, &q).await?;
    Ok(success_many(rows))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: String,
}

pub async fn update_contact_submission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, CONTACT_SUBMISSIONS, Action::Write)?;
    let id = parse_uuid(&id)?;
    let change: StatusChange = parse_body(body)?;
    let status: ContactStatus = change.status.parse()?;
    let row = contact::set_status(&state.pool, &state.settings.cms_schema, id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contact submission {}", id)))?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_UPDATE, CONTACT_SUBMISSIONS)
            .actor(&user)
            .resource_id(id)
            .details(json!({ "status": status.as_str() })),
    );
    Ok(success_one_ok(row))
}

// Users

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, USERS, Action::Read)?;
    let rows = users::list(&state.pool, &state.settings.cms_schema, &q).await?;
    Ok(success_many(rows))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, USERS, Action::Read)?;
    let id = parse_uuid(&id)?;
    let row = users::get(&state.pool, &state.settings.cms_schema, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;
    Ok(success_one_ok(row))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, USERS, Action::Write)?;
    let new: NewUser = parse_body(body)?;
    let created = users::create(&state.pool, &state.settings.cms_schema, &user, new).await?;
    tracing::info!(user_id = %created.id, role = %created.role, actor = %user.user_id, "user created");
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_CREATE, USERS)
            .actor(&user)
            .resource_id(created.id)
            .details(json!({ "role": created.role })),
    );
    Ok(success_one(created))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, USERS, Action::Write)?;
    let id = parse_uuid(&id)?;
    let changes: UserUpdate = parse_body(body)?;
    let updated = users::update(&state.pool, &state.settings.cms_schema, &user, id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;
    let new_role = updated.user.role.clone();
    if new_role != updated.previous_role.as_str() {
        tracing::info!(user_id = %id, from = %updated.previous_role, to = %new_role, "role changed");
        audit::record_detached(
            &state,
            AuditEntry::new(audit::ACTION_ROLE_CHANGE, USERS)
                .actor(&user)
                .resource_id(id)
                .details(json!({ "from": updated.previous_role, "to": new_role })),
        );
    } else {
        audit::record_detached(
            &state,
            AuditEntry::new(audit::ACTION_UPDATE, USERS).actor(&user).resource_id(id),
        );
    }
    Ok(success_one_ok(updated.user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, USERS, Action::Delete)?;
    let id = parse_uuid(&id)?;
    let deleted = users::delete(&state.pool, &state.settings.cms_schema, &user, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", id)))?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_DELETE, USERS)
            .actor(&user)
            .resource_id(id)
            .details(json!({ "email": deleted.email, "role": deleted.role })),
    );
    Ok(StatusCode::NO_CONTENT)
}

// Audit log and metrics

pub async fn list_audit_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, AUDIT_LOGS, Action::Read)?;
    let rows = audit::list(&state.pool, &state.settings.cms_schema, &q).await?;
    Ok(success_many(rows))
}

pub async fn security_metrics(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &user, SECURITY, Action::Read)?;
    let metrics = audit::security_metrics(&state.pool, &state.settings.cms_schema).await?;
    Ok(success_one_ok(metrics))
}
