//! Content routes. Handlers resolve the entity by its path segment, so one set of routes serves
//! every entity the content model exposes.

use crate::handlers::entity::{
    batch_update, bulk_create, create, delete as delete_handler, list, page_faqs, read, read_by_slug, update,
};
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

/// Mounted at `/api/v1/content`.
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route("/:path_segment/bulk", post(bulk_create))
        .route("/:path_segment/batch", patch(batch_update))
        .route("/:path_segment/slug/:slug", get(read_by_slug))
        .route("/:path_segment/:id", get(read).patch(update).delete(delete_handler))
}

/// Mounted at `/api/v1/pages`.
pub fn page_routes() -> Router<AppState> {
    Router::new().route("/:page_slug/faqs", get(page_faqs))
}
