//! Generic CRUD execution against PostgreSQL.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::service::RequestValidator;
use crate::slug::{is_valid_slug, slugify};
use crate::sql::{delete, insert, select_by_column, select_list, select_via_join, update, IncludeSelect, ListQuery, QueryBuf};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;

/// Upper bound on items in one bulk create or batch update.
pub const BATCH_LIMIT: usize = 100;

/// Result of a batch update: items succeed or fail independently.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub updated: Vec<Value>,
    pub errors: usize,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub id: Option<Value>,
    pub message: String,
}

pub struct CrudService;

impl CrudService {
    pub async fn list(pool: &PgPool, entity: &ResolvedEntity, query: &ListQuery<'_>) -> Result<Vec<Value>, AppError> {
        let q = select_list(entity, query);
        let rows = fetch_all(pool, &q).await?;
        Ok(redact_all(entity, rows, &query.includes))
    }

    /// One row where `column = value`. Used for primary-key and slug lookups.
    pub async fn read_by(
        pool: &PgPool,
        entity: &ResolvedEntity,
        column: &str,
        value: &Value,
        published_only: bool,
        includes: &[IncludeSelect<'_>],
    ) -> Result<Option<Value>, AppError> {
        let q = select_by_column(entity, column, value, published_only, includes);
        let row = fetch_optional(pool, &q).await?;
        Ok(row.map(|r| redact_row(entity, r, includes)))
    }

    /// Rows of `entity` linked through the join entity, e.g. FAQs assigned to a page.
    pub async fn list_via_join(
        pool: &PgPool,
        entity: &ResolvedEntity,
        join: &ResolvedEntity,
        join_fk_column: &str,
        join_filter_column: &str,
        value: &Value,
        published_only: bool,
    ) -> Result<Vec<Value>, AppError> {
        let q = select_via_join(entity, join, join_fk_column, join_filter_column, value, published_only);
        let rows = fetch_all(pool, &q).await?;
        Ok(redact_all(entity, rows, &[]))
    }

    /// Insert one row. A unique violation surfaces as 409.
    pub async fn create(pool: &PgPool, entity: &ResolvedEntity, body: &HashMap<String, Value>) -> Result<Value, AppError> {
        let include_pk = body.contains_key(&entity.pk_columns[0]);
        let q = insert(entity, body, include_pk);
        let row = fetch_optional(pool, &q)
            .await
            .map_err(|e| conflict_or(e, entity))?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        Ok(redact_row(entity, row, &[]))
    }

    pub async fn update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &Value,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let q = update(entity, id, body);
        let row = fetch_optional(pool, &q).await.map_err(|e| conflict_or(e, entity))?;
        Ok(row.map(|r| redact_row(entity, r, &[])))
    }

    /// Delete by primary key. Returns the deleted row, or None when nothing matched.
    pub async fn delete(pool: &PgPool, entity: &ResolvedEntity, id: &Value) -> Result<Option<Value>, AppError> {
        let q = delete(entity, id);
        let row = fetch_optional(pool, &q).await?;
        Ok(row.map(|r| redact_row(entity, r, &[])))
    }

    /// All-or-nothing insert of up to [`BATCH_LIMIT`] rows.
    pub async fn bulk_create(
        pool: &PgPool,
        entity: &ResolvedEntity,
        items: &[HashMap<String, Value>],
    ) -> Result<Vec<Value>, AppError> {
        check_batch_size(items.len())?;
        let mut out = Vec::with_capacity(items.len());
        let mut tx = pool.begin().await?;
        for body in items {
            let include_pk = body.contains_key(&entity.pk_columns[0]);
            let q = insert(entity, body, include_pk);
            if let Some(row) = fetch_optional(&mut *tx, &q).await.map_err(|e| conflict_or(e, entity))? {
                out.push(redact_row(entity, row, &[]));
            }
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Concurrent, independent updates. Each item carries its primary key and is validated on
    /// its own; a failing item does not roll back the others. Failures are counted and described per item.
    pub async fn batch_update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        items: Vec<HashMap<String, Value>>,
    ) -> Result<BatchOutcome, AppError> {
        check_batch_size(items.len())?;
        let pk = entity.pk_columns[0].as_str();
        let tasks = items.into_iter().enumerate().map(|(index, mut body)| async move {
            let Some(id) = body.remove(pk).filter(|v| !v.is_null()) else {
                return (index, None, Err(AppError::Validation(format!("each item must have '{}'", pk))));
            };
            let slug_supplied = entity.slug_column.as_ref().is_some_and(|c| body.contains_key(c));
            let checked = if slug_supplied { apply_slug(entity, &mut body) } else { Ok(()) };
            if let Err(e) = checked.and_then(|_| RequestValidator::validate_partial(&body, &entity.validation)) {
                return (index, Some(id), Err(e));
            }
            let result = Self::update(pool, entity, &id, &body).await;
            (index, Some(id), result)
        });

        let mut outcome = BatchOutcome::default();
        for (index, id, result) in join_all(tasks).await {
            match result {
                Ok(Some(row)) => outcome.updated.push(row),
                Ok(None) => outcome.failures.push(BatchFailure {
                    index,
                    id,
                    message: "not found".into(),
                }),
                Err(e) => {
                    tracing::warn!(entity = %entity.path_segment, index, error = %e, "batch item failed");
                    outcome.failures.push(BatchFailure {
                        index,
                        id,
                        message: item_error_message(&e),
                    });
                }
            }
        }
        outcome.errors = outcome.failures.len();
        Ok(outcome)
    }
}

/// Fills the slug from `slug_source` when the body has none, and checks a supplied slug's shape.
/// A slug key that is present but blank must be regenerable from the source column.
pub fn apply_slug(entity: &ResolvedEntity, body: &mut HashMap<String, Value>) -> Result<(), AppError> {
    let Some(slug_col) = entity.slug_column.as_deref() else {
        return Ok(());
    };
    let supplied = body
        .get(slug_col)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    match supplied {
        Some(slug) if is_valid_slug(&slug) => {
            body.insert(slug_col.to_string(), Value::String(slug));
        }
        Some(slug) => {
            return Err(AppError::Validation(format!(
                "{} '{}' must be lowercase letters, digits and single hyphens",
                slug_col, slug
            )));
        }
        None => {
            let source = entity
                .slug_source
                .as_deref()
                .and_then(|c| body.get(c))
                .and_then(Value::as_str)
                .map(slugify)
                .filter(|s| !s.is_empty());
            match source {
                Some(slug) => {
                    body.insert(slug_col.to_string(), Value::String(slug));
                }
                None if body.contains_key(slug_col) => {
                    return Err(AppError::Validation(format!("{} must not be blank", slug_col)));
                }
                None => {}
            }
        }
    }
    Ok(())
}

fn check_batch_size(n: usize) -> Result<(), AppError> {
    if n == 0 {
        return Err(AppError::BadRequest("at least one item is required".into()));
    }
    if n > BATCH_LIMIT {
        return Err(AppError::BadRequest(format!("batch limited to {} items", BATCH_LIMIT)));
    }
    Ok(())
}

fn conflict_or(e: AppError, entity: &ResolvedEntity) -> AppError {
    match e {
        AppError::Db(db) => AppError::from_db_conflict(db, &format!("{} with the same unique value", entity.path_segment)),
        other => other,
    }
}

/// Client-facing text for a failed batch item; database internals stay in the log.
fn item_error_message(e: &AppError) -> String {
    match e {
        AppError::Db(_) | AppError::Config(_) => "update failed".into(),
        other => other.to_string(),
    }
}

fn redact_all(entity: &ResolvedEntity, rows: Vec<Value>, includes: &[IncludeSelect<'_>]) -> Vec<Value> {
    rows.into_iter().map(|r| redact_row(entity, r, includes)).collect()
}

/// Strips sensitive columns from the row and from any embedded related rows.
fn redact_row(entity: &ResolvedEntity, mut row: Value, includes: &[IncludeSelect<'_>]) -> Value {
    entity.redact(&mut row);
    for inc in includes {
        if let Some(embedded) = row.get_mut(inc.name) {
            match embedded {
                Value::Array(items) => items.iter_mut().for_each(|i| inc.related.redact(i)),
                other => inc.related.redact(other),
            }
        }
    }
    row
}

async fn fetch_all<'e, E: PgExecutor<'e>>(executor: E, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let rows = query.fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_optional<'e, E: PgExecutor<'e>>(executor: E, q: &QueryBuf) -> Result<Option<Value>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let row = query.fetch_optional(executor).await?;
    Ok(row.as_ref().map(row_to_json))
}

/// Row to a JSON object keyed by column name, decoding by the column's Postgres type.
pub fn row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row, TypeInfo};
    let mut map = serde_json::Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        let v = match col.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i).ok().flatten().map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i).ok().flatten().map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i).ok().flatten().map(Value::from),
            "FLOAT4" => row.try_get::<Option<f32>, _>(i).ok().flatten().map(|n| Value::from(f64::from(n))),
            "FLOAT8" => row.try_get::<Option<f64>, _>(i).ok().flatten().map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(i).ok().flatten().map(Value::Bool),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(i)
                .ok()
                .flatten()
                .map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::String(d.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i).ok().flatten(),
            _ => row.try_get::<Option<String>, _>(i).ok().flatten().map(Value::String),
        };
        map.insert(col.name().to_string(), v.unwrap_or(Value::Null));
    }
    Value::Object(map)
}
