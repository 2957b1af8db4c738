//! Shared application state for all routes.

use crate::config::ResolvedModel;
use crate::settings::Settings;
use crate::store;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Content model resolved at startup; schema changes go through `migrate` and a restart.
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, model: ResolvedModel, settings: Settings) -> Self {
        AppState {
            pool,
            model: Arc::new(model),
            settings: Arc::new(settings),
        }
    }

    /// Schema-qualified name of a fixed table (`cms.audit_logs`).
    pub fn system_table(&self, table: &str) -> String {
        store::system_table(&self.settings.cms_schema, table)
    }
}
