//! Contact-form intake. Submissions are stored for follow-up in the admin area.

use crate::error::AppError;
use crate::service::is_valid_email;
use crate::store::{system_table, CONTACT_SUBMISSIONS_TABLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;

const NAME_MAX: usize = 120;
const MESSAGE_MAX: usize = 5_000;
const SHORT_FIELD_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    New,
    Contacted,
    Closed,
    Spam,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::New => "new",
            ContactStatus::Contacted => "contacted",
            ContactStatus::Closed => "closed",
            ContactStatus::Spam => "spam",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ContactStatus::New),
            "contacted" => Ok(ContactStatus::Contacted),
            "closed" => Ok(ContactStatus::Closed),
            "spam" => Ok(ContactStatus::Spam),
            other => Err(AppError::BadRequest(format!(
                "invalid status '{}' (expected new, contacted, closed or spam)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "source_page")]
    pub source_page: Option<String>,
}

/// Trimmed, checked submission ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: String,
    pub source_page: Option<String>,
}

fn optional(field: &str, v: &Option<String>) -> Result<Option<String>, AppError> {
    let v = v.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match v {
        Some(s) if s.chars().count() > SHORT_FIELD_MAX => Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, SHORT_FIELD_MAX
        ))),
        other => Ok(other.map(str::to_string)),
    }
}

impl ContactRequest {
    pub fn validate(&self) -> Result<NewSubmission, AppError> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > NAME_MAX {
            return Err(AppError::Validation(format!("name is required (at most {} characters)", NAME_MAX)));
        }
        let email = self.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::Validation("email must be a valid email address".into()));
        }
        let message = self.message.trim();
        if message.is_empty() || message.chars().count() > MESSAGE_MAX {
            return Err(AppError::Validation(format!(
                "message is required (at most {} characters)",
                MESSAGE_MAX
            )));
        }
        Ok(NewSubmission {
            name: name.to_string(),
            email,
            phone: optional("phone", &self.phone)?,
            company: optional("company", &self.company)?,
            message: message.to_string(),
            source_page: optional("source_page", &self.source_page)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContactSubmission {
    pub id: uuid::Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: String,
    pub source_page: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const COLUMNS: &str = "id, name, email, phone, company, message, source_page, status, created_at, updated_at";

pub async fn create(pool: &PgPool, schema: &str, s: &NewSubmission) -> Result<uuid::Uuid, AppError> {
    let id = uuid::Uuid::new_v4();
    sqlx::query(&format!(
        "INSERT INTO {} (id, name, email, phone, company, message, source_page, status) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        system_table(schema, CONTACT_SUBMISSIONS_TABLE)
    ))
    .bind(id)
    .bind(&s.name)
    .bind(&s.email)
    .bind(&s.phone)
    .bind(&s.company)
    .bind(&s.message)
    .bind(&s.source_page)
    .bind(ContactStatus::New.as_str())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Newest first, optionally by status.
pub async fn list(pool: &PgPool, schema: &str, query: &SubmissionQuery) -> Result<Vec<ContactSubmission>, AppError> {
    let status = query.status.as_deref().map(ContactStatus::from_str).transpose()?;
    let rows = sqlx::query_as::<_, ContactSubmission>(&format!(
        "SELECT {} FROM {} WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        COLUMNS,
        system_table(schema, CONTACT_SUBMISSIONS_TABLE)
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(query.limit.unwrap_or(100).clamp(1, 1000))
    .bind(query.offset.unwrap_or(0).max(0))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_status(
    pool: &PgPool,
    schema: &str,
    id: uuid::Uuid,
    status: ContactStatus,
) -> Result<Option<ContactSubmission>, AppError> {
    let row = sqlx::query_as::<_, ContactSubmission>(&format!(
        "UPDATE {} SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        system_table(schema, CONTACT_SUBMISSIONS_TABLE),
        COLUMNS
    ))
    .bind(id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
