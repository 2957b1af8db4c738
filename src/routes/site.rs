//! Public site and admin-area routes.

use crate::handlers::{admin, site};
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};

/// Mounted at `/api/v1`.
pub fn site_routes() -> Router<AppState> {
    Router::new()
        .route("/seo", get(site::effective_seo))
        .route("/quote", post(site::quote))
        .route("/contact", post(site::submit_contact))
        .route("/me", get(site::me))
}

/// Mounted at `/api/v1/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/seo/defaults", get(admin::get_seo_defaults).put(admin::put_seo_defaults))
        .route("/seo/pages", get(admin::list_seo_pages).put(admin::put_seo_page))
        .route("/seo/pages/:id", delete(admin::delete_seo_page))
        .route("/contact-submissions", get(admin::list_contact_submissions))
        .route("/contact-submissions/:id", patch(admin::update_contact_submission))
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/:id",
            get(admin::get_user).patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/audit-logs", get(admin::list_audit_logs))
        .route("/security/metrics", get(admin::security_metrics))
}
