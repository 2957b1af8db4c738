//! Runtime settings loaded from environment variables.

use crate::auth::jwt::JwtSettings;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Server settings. Every field except the JWT secret has a local-development default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Directory holding the content model JSON files.
    pub content_config_path: PathBuf,
    /// Schema for users, audit log, SEO and other fixed tables.
    pub cms_schema: String,
    pub db_max_connections: u32,
    pub request_body_limit_bytes: usize,
    /// Allowed CORS origins; empty means no CORS layer.
    pub cors_origins: Vec<String>,
    pub jwt: JwtSettings,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// | Env Var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `DATABASE_URL`              | `postgres://localhost/site_cms`  |
    /// | `HOST`                      | `0.0.0.0`                        |
    /// | `PORT`                      | `3000`                           |
    /// | `CONTENT_CONFIG_PATH`       | `content`                        |
    /// | `CMS_SCHEMA`                | `cms`                            |
    /// | `DB_MAX_CONNECTIONS`        | `5`                              |
    /// | `REQUEST_BODY_LIMIT_BYTES`  | `1048576`                        |
    /// | `CORS_ORIGINS`              | (none)                           |
    /// | `JWT_SECRET`                | required                         |
    /// | `JWT_AUDIENCE`              | `authenticated`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = parse_var("PORT", &get("PORT", "3000"))?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", &get("DB_MAX_CONNECTIONS", "5"))?;
        let request_body_limit_bytes =
            parse_var("REQUEST_BODY_LIMIT_BYTES", &get("REQUEST_BODY_LIMIT_BYTES", "1048576"))?;

        let cms_schema = get("CMS_SCHEMA", "cms");
        if !is_identifier(&cms_schema) {
            return Err(ConfigError::Env(format!(
                "CMS_SCHEMA must be a plain identifier, got '{}'",
                cms_schema
            )));
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::Env("JWT_SECRET must be set".into()))?;

        Ok(Settings {
            database_url: get("DATABASE_URL", "postgres://localhost/site_cms"),
            host: get("HOST", "0.0.0.0"),
            port,
            content_config_path: PathBuf::from(get("CONTENT_CONFIG_PATH", "content")),
            cms_schema,
            db_max_connections,
            request_body_limit_bytes,
            cors_origins,
            jwt: JwtSettings {
                secret,
                audience: lookup("JWT_AUDIENCE").filter(|s| !s.is_empty()).or_else(|| Some("authenticated".into())),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Env(format!("{} has an invalid value: '{}'", key, raw)))
}

/// Lowercase identifier safe to splice unquoted into DDL.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
