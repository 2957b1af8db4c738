//! Fixed system tables (users, audit log, contact intake, SEO, schema history) and database bootstrap.
//! All of them live in the schema named by `CMS_SCHEMA` (default `cms`).

use crate::config::FullConfig;
use crate::error::{AppError, ConfigError};
use sha2::{Digest, Sha256};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

pub const USERS_TABLE: &str = "users";
pub const AUDIT_LOGS_TABLE: &str = "audit_logs";
pub const CONTACT_SUBMISSIONS_TABLE: &str = "contact_submissions";
pub const SEO_DEFAULTS_TABLE: &str = "seo_defaults";
pub const PAGE_SEO_TABLE: &str = "page_seo";
pub const SCHEMA_HISTORY_TABLE: &str = "schema_history";

/// Schema-qualified system table name. `schema` is checked to be a plain identifier when settings load.
pub fn system_table(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// Create the system schema and its tables. Every statement is idempotent.
pub async fn ensure_system_tables(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT,
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'editor', 'viewer', 'user')),
                user_metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_sign_in_at TIMESTAMPTZ
            )
            "#,
            system_table(schema, USERS_TABLE)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                actor_id UUID,
                actor_email TEXT,
                action TEXT NOT NULL,
                resource TEXT NOT NULL,
                resource_id TEXT,
                details JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            system_table(schema, AUDIT_LOGS_TABLE)
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS audit_logs_created_at_idx ON {} (created_at DESC)",
            system_table(schema, AUDIT_LOGS_TABLE)
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS audit_logs_action_idx ON {} (action, created_at DESC)",
            system_table(schema, AUDIT_LOGS_TABLE)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT,
                company TEXT,
                message TEXT NOT NULL,
                source_page TEXT,
                status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'contacted', 'closed', 'spam')),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            system_table(schema, CONTACT_SUBMISSIONS_TABLE)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY DEFAULT 'global',
                site_name TEXT NOT NULL DEFAULT '',
                title_template TEXT NOT NULL DEFAULT '%s',
                default_title TEXT NOT NULL DEFAULT '',
                default_description TEXT NOT NULL DEFAULT '',
                default_keywords JSONB NOT NULL DEFAULT '[]'::jsonb,
                default_og_image TEXT,
                canonical_base_url TEXT NOT NULL DEFAULT '',
                twitter_handle TEXT,
                robots TEXT NOT NULL DEFAULT 'index, follow',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            system_table(schema, SEO_DEFAULTS_TABLE)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                page_path TEXT NOT NULL UNIQUE,
                title TEXT,
                title_is_absolute BOOLEAN NOT NULL DEFAULT FALSE,
                description TEXT,
                keywords JSONB NOT NULL DEFAULT '[]'::jsonb,
                og_image TEXT,
                canonical_url TEXT,
                robots TEXT,
                no_index BOOLEAN,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            system_table(schema, PAGE_SEO_TABLE)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                checksum TEXT NOT NULL UNIQUE,
                tables JSONB NOT NULL DEFAULT '[]'::jsonb,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            system_table(schema, SCHEMA_HISTORY_TABLE)
        ),
    ];
    for sql in &statements {
        sqlx::query(sql).execute(pool).await?;
    }
    tracing::debug!(schema, "system tables ensured");
    Ok(())
}

/// Stable fingerprint of a content model. Object keys are sorted before hashing.
pub fn model_checksum(config: &FullConfig) -> Result<String, ConfigError> {
    let value = serde_json::to_value(config).map_err(|e| ConfigError::Load(e.to_string()))?;
    let bytes = serde_json::to_vec(&value).map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Record that the model with `checksum` has been applied. Re-applying bumps `applied_at`.
pub async fn record_schema_version(
    pool: &PgPool,
    schema: &str,
    checksum: &str,
    tables: &[String],
) -> Result<(), AppError> {
    sqlx::query(&format!(
        "INSERT INTO {} (checksum, tables, applied_at) VALUES ($1, $2, NOW())
         ON CONFLICT (checksum) DO UPDATE SET tables = EXCLUDED.tables, applied_at = NOW()",
        system_table(schema, SCHEMA_HISTORY_TABLE)
    ))
    .bind(checksum)
    .bind(serde_json::json!(tables))
    .execute(pool)
    .await?;
    Ok(())
}

/// Whether a model with `checksum` was ever applied. A missing history table counts as "no".
pub async fn is_schema_version_applied(pool: &PgPool, schema: &str, checksum: &str) -> Result<bool, AppError> {
    let exists: (Option<String>,) = sqlx::query_as("SELECT to_regclass($1)::text")
        .bind(system_table(schema, SCHEMA_HISTORY_TABLE))
        .fetch_one(pool)
        .await?;
    if exists.0.is_none() {
        return Ok(false);
    }
    let found: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE checksum = $1)",
        system_table(schema, SCHEMA_HISTORY_TABLE)
    ))
    .bind(checksum)
    .fetch_one(pool)
    .await?;
    Ok(found.0)
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
