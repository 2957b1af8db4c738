//! Content-management backend for a modular-building rental marketing site.
//!
//! Site content (solutions, industries, locations, testimonials, FAQs, homepage sections,
//! news) is declared in JSON and served through one generic CRUD surface. Around it sit the
//! role-based access rules, SEO defaults and per-page overrides, the rental quote estimator,
//! contact intake, user management, and the audit log.

pub mod audit;
pub mod auth;
pub mod case;
pub mod config;
pub mod contact;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod quote;
pub mod response;
pub mod routes;
pub mod seo;
pub mod service;
pub mod settings;
pub mod slug;
pub mod sql;
pub mod state;
pub mod store;
pub mod users;

pub use config::{load_from_dir, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::app_router;
pub use service::CrudService;
pub use settings::Settings;
pub use state::AppState;
pub use store::{ensure_database_exists, is_schema_version_applied, model_checksum, record_schema_version};
