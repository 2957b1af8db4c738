//! Audit log: every mutation and every access denial leaves a row in `audit_logs`.
//! Also the aggregate counters behind the security dashboard.

use crate::auth::{AuthUser, Role};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{system_table, AUDIT_LOGS_TABLE, USERS_TABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;

pub const ACTION_CREATE: &str = "create";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_BULK_CREATE: &str = "bulk_create";
pub const ACTION_BATCH_UPDATE: &str = "batch_update";
pub const ACTION_ROLE_CHANGE: &str = "role_change";
pub const ACTION_ACCESS_DENIED: &str = "access_denied";

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 500;
const TOP_DENIED_RESOURCES: i64 = 5;

/// One row to be written. Built with [`AuditEntry::new`] and the chained setters.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub actor_id: Option<uuid::Uuid>,
    pub actor_email: Option<String>,
    pub details: Value,
}

impl AuditEntry {
    pub fn new(action: &str, resource: &str) -> Self {
        AuditEntry {
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: None,
            actor_id: None,
            actor_email: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, user: &AuthUser) -> Self {
        // Subjects that are not uuids are kept in details rather than dropped.
        match uuid::Uuid::parse_str(&user.user_id) {
            Ok(id) => self.actor_id = Some(id),
            Err(_) => {
                if let Value::Object(map) = &mut self.details {
                    map.insert("actor_sub".into(), Value::String(user.user_id.clone()));
                }
            }
        }
        self.actor_email = user.email.clone();
        self
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    /// Merges object fields into the details; any other value replaces them.
    pub fn details(mut self, details: Value) -> Self {
        match (&mut self.details, details) {
            (Value::Object(existing), Value::Object(extra)) => existing.extend(extra),
            (slot, other) => *slot = other,
        }
        self
    }
}

pub async fn record(pool: &PgPool, schema: &str, entry: &AuditEntry) -> Result<(), AppError> {
    sqlx::query(&format!(
        "INSERT INTO {} (actor_id, actor_email, action, resource, resource_id, details) VALUES ($1, $2, $3, $4, $5, $6)",
        system_table(schema, AUDIT_LOGS_TABLE)
    ))
    .bind(entry.actor_id)
    .bind(&entry.actor_email)
    .bind(&entry.action)
    .bind(&entry.resource)
    .bind(&entry.resource_id)
    .bind(&entry.details)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the row on a spawned task. Failures are logged, never surfaced to the caller.
pub fn record_detached(state: &AppState, entry: AuditEntry) {
    let pool = state.pool.clone();
    let schema = state.settings.cms_schema.clone();
    tokio::spawn(async move {
        if let Err(e) = record(&pool, &schema, &entry).await {
            tracing::warn!(error = %e, action = %entry.action, resource = %entry.resource, "audit write failed");
        }
    });
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub resource: Option<String>,
    pub actor_id: Option<uuid::Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub actor_id: Option<uuid::Uuid>,
    pub actor_email: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

/// Newest first. Absent filters match everything.
pub async fn list(pool: &PgPool, schema: &str, query: &AuditLogQuery) -> Result<Vec<AuditLogRow>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);
    let rows = sqlx::query_as::<_, AuditLogRow>(&format!(
        "SELECT id, actor_id, actor_email, action, resource, resource_id, details, created_at FROM {}
         WHERE ($1::text IS NULL OR action = $1)
           AND ($2::text IS NULL OR resource = $2)
           AND ($3::uuid IS NULL OR actor_id = $3)
         ORDER BY created_at DESC, id DESC
         LIMIT $4 OFFSET $5",
        system_table(schema, AUDIT_LOGS_TABLE)
    ))
    .bind(&query.action)
    .bind(&query.resource)
    .bind(query.actor_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
pub struct DeniedResource {
    pub resource: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SecurityMetrics {
    pub events_24h: i64,
    pub events_7d: i64,
    pub access_denied_24h: i64,
    pub access_denied_7d: i64,
    pub role_changes_7d: i64,
    pub deletions_7d: i64,
    /// Every role is present, zero when no user holds it.
    pub users_by_role: BTreeMap<String, i64>,
    pub top_denied_resources: Vec<DeniedResource>,
    pub generated_at: DateTime<Utc>,
}

pub async fn security_metrics(pool: &PgPool, schema: &str) -> Result<SecurityMetrics, AppError> {
    let audit = system_table(schema, AUDIT_LOGS_TABLE);
    let counts: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(&format!(
        "SELECT
            COUNT(*) FILTER (WHERE created_at > NOW() - INTERVAL '24 hours'),
            COUNT(*),
            COUNT(*) FILTER (WHERE action = $1 AND created_at > NOW() - INTERVAL '24 hours'),
            COUNT(*) FILTER (WHERE action = $1),
            COUNT(*) FILTER (WHERE action = $2),
            COUNT(*) FILTER (WHERE action = $3)
         FROM {} WHERE created_at > NOW() - INTERVAL '7 days'",
        audit
    ))
    .bind(ACTION_ACCESS_DENIED)
    .bind(ACTION_ROLE_CHANGE)
    .bind(ACTION_DELETE)
    .fetch_one(pool)
    .await?;

    let role_rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT role, COUNT(*) FROM {} GROUP BY role",
        system_table(schema, USERS_TABLE)
    ))
    .fetch_all(pool)
    .await?;
    let mut users_by_role: BTreeMap<String, i64> = Role::ALL.iter().map(|r| (r.as_str().to_string(), 0)).collect();
    for (role, n) in role_rows {
        *users_by_role.entry(role).or_default() += n;
    }

    let denied: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT resource, COUNT(*) AS n FROM {}
         WHERE action = $1 AND created_at > NOW() - INTERVAL '7 days'
         GROUP BY resource ORDER BY n DESC, resource LIMIT $2",
        audit
    ))
    .bind(ACTION_ACCESS_DENIED)
    .bind(TOP_DENIED_RESOURCES)
    .fetch_all(pool)
    .await?;

    Ok(SecurityMetrics {
        events_24h: counts.0,
        events_7d: counts.1,
        access_denied_24h: counts.2,
        access_denied_7d: counts.3,
        role_changes_7d: counts.4,
        deletions_7d: counts.5,
        users_by_role,
        top_denied_resources: denied
            .into_iter()
            .map(|(resource, count)| DeniedResource { resource, count })
            .collect(),
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor() -> AuthUser {
        AuthUser {
            user_id: "6f1c2a9e-1d7b-4d55-9a43-2f7f9c0b8e21".into(),
            email: Some("ed@example.com".into()),
            role: Role::Editor,
        }
    }

    #[test]
    fn builder_sets_actor_and_merges_details() {
        let entry = AuditEntry::new(ACTION_UPDATE, "faqs")
            .actor(&editor())
            .resource_id(42)
            .details(json!({"fields": ["answer"]}))
            .details(json!({"status": "ok"}));
        assert_eq!(entry.actor_id.unwrap().to_string(), "6f1c2a9e-1d7b-4d55-9a43-2f7f9c0b8e21");
        assert_eq!(entry.actor_email.as_deref(), Some("ed@example.com"));
        assert_eq!(entry.resource_id.as_deref(), Some("42"));
        assert_eq!(entry.details, json!({"fields": ["answer"], "status": "ok"}));
    }

    #[test]
    fn non_uuid_subject_is_kept_in_details() {
        let mut user = editor();
        user.user_id = "service-account".into();
        let entry = AuditEntry::new(ACTION_ACCESS_DENIED, "users").actor(&user);
        assert!(entry.actor_id.is_none());
        assert_eq!(entry.details["actor_sub"], "service-account");
    }
}
