//! Router assembly.

mod common;
mod entity;
mod site;

pub use common::common_routes;
pub use entity::{content_routes, page_routes};
pub use site::{admin_routes, site_routes};

use crate::error::AppError;
use crate::state::AppState;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

async fn not_found() -> AppError {
    AppError::NotFound("no such route".into())
}

/// The full application: health routes at the root, the API under `/api/v1`.
pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(site_routes())
        .nest("/content", content_routes())
        .nest("/pages", page_routes())
        .nest("/admin", admin_routes());

    let mut app = Router::new()
        .merge(common_routes())
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(state.settings.request_body_limit_bytes))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&state.settings.cors_origins) {
        app = app.layer(cors);
    }
    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_is_off_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["https://www.example.com".into()]).is_some());
    }
}
