//! End-to-end flows against a real Postgres. Opt-in: set `TEST_DATABASE_URL` to run them,
//! otherwise each test returns immediately. System tables go into a throwaway schema that is
//! dropped at the end; content rows are created with unique names and deleted again.

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::{send, ADMIN_ID, SECRET};
use modular_site_cms::{app_router, apply_migrations, ensure_database_exists, load_from_dir, resolve, AppState, Settings};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;

/// Content schemas are shared between tests; migrating them concurrently races on `CREATE TYPE`.
static MIGRATE: Mutex<()> = Mutex::const_new(());

struct Harness {
    app: Router,
    pool: PgPool,
    schema: String,
}

impl Harness {
    async fn start() -> Option<Harness> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let schema = format!("cms_test_{}", uuid::Uuid::new_v4().simple());
        let settings = Settings::from_lookup(|key| match key {
            "JWT_SECRET" => Some(SECRET.to_string()),
            "DATABASE_URL" => Some(url.clone()),
            "CMS_SCHEMA" => Some(schema.clone()),
            _ => None,
        })
        .unwrap();
        ensure_database_exists(&settings.database_url).await.unwrap();
        let pool = PgPoolOptions::new().max_connections(4).connect(&settings.database_url).await.unwrap();
        let config = load_from_dir(&common::content_dir()).await.unwrap();
        {
            let _guard = MIGRATE.lock().await;
            apply_migrations(&pool, &config, &schema).await.unwrap();
        }
        let model = resolve(&config).unwrap();
        let app = app_router(AppState::new(pool.clone(), model, settings));
        Some(Harness { app, pool, schema })
    }

    async fn call(&self, method: &str, uri: &str, role: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        send(self.app.clone(), method, uri, role, body).await
    }

    async fn finish(self) {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

fn tag() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[tokio::test]
async fn numeric_columns_accept_integers_then_fractions() {
    let Some(h) = Harness::start().await else { return };
    let tag = tag();

    let (status, body) = h
        .call(
            "POST",
            "/api/v1/content/solutions",
            Some("editor"),
            Some(json!({"title": format!("Office {}", tag), "starting_price": 100})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["starting_price"], "100");
    assert_eq!(body["data"]["slug"], format!("office-{}", tag));
    let first = body["data"]["id"].as_str().unwrap().to_string();

    // Same statement text as above with a fractional value bound this time.
    let (status, body) = h
        .call(
            "POST",
            "/api/v1/content/solutions",
            Some("editor"),
            Some(json!({"title": format!("Storage {}", tag), "starting_price": 99.5})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["starting_price"], "99.5");
    let second = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = h
        .call("PATCH", &format!("/api/v1/content/solutions/{}", first), Some("editor"), Some(json!({"starting_price": 120.25})))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["starting_price"], "120.25");

    let (status, _) = h
        .call("PATCH", &format!("/api/v1/content/solutions/{}", first), Some("editor"), Some(json!({"slug": ""})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    for id in [&first, &second] {
        let (status, _) = h.call("DELETE", &format!("/api/v1/content/solutions/{}", id), Some("editor"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    h.finish().await;
}

#[tokio::test]
async fn typed_filters_survive_a_rejected_value() {
    let Some(h) = Harness::start().await else { return };
    let (status, _) = h.call("GET", "/api/v1/content/faqs?display_order=0", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call("GET", "/api/v1/content/faqs?display_order=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = h.call("GET", "/api/v1/content/faqs?display_order=0&is_active=true", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    h.finish().await;
}

#[tokio::test]
async fn faq_lifecycle_with_batch_update_and_publish_gating() {
    let Some(h) = Harness::start().await else { return };
    let tag = tag();
    let page = format!("site-offices-{}", tag);

    let mut ids = Vec::new();
    for (question, active) in [("Is delivery included?", true), ("Do you rent cranes?", false)] {
        let (status, body) = h
            .call(
                "POST",
                "/api/v1/content/faqs",
                Some("editor"),
                Some(json!({"question": format!("{} {}", question, tag), "answer": "Yes.", "is_active": active})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }
    let (active, inactive) = (ids[0].clone(), ids[1].clone());

    let (status, body) = h
        .call(
            "PATCH",
            "/api/v1/content/faqs/batch",
            Some("editor"),
            Some(json!([
                {"id": active, "display_order": 3},
                {"id": uuid::Uuid::new_v4().to_string(), "display_order": 1},
                {"display_order": 2}
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["updated"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["updated"][0]["display_order"], 3);
    assert_eq!(body["data"]["errors"], 2);

    for id in [&active, &inactive] {
        let (status, body) = h
            .call("POST", "/api/v1/content/faq-pages", Some("editor"), Some(json!({"faq_id": id, "page_slug": page})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    let (status, body) = h.call("GET", &format!("/api/v1/pages/{}/faqs", page), None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let listed: Vec<&str> = body["data"].as_array().unwrap().iter().filter_map(|f| f["id"].as_str()).collect();
    assert_eq!(listed, vec![active.as_str()]);

    let uri = format!("/api/v1/content/faqs/{}", inactive);
    let (status, _) = h.call("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = h.call("GET", &uri, Some("editor"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    for id in [&active, &inactive] {
        let uri = format!("/api/v1/content/faqs/{}", id);
        let (status, _) = h.call("DELETE", &uri, Some("editor"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = h.call("DELETE", &uri, Some("editor"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    h.finish().await;
}

#[tokio::test]
async fn last_admin_is_protected() {
    let Some(h) = Harness::start().await else { return };

    let (status, body) = h
        .call(
            "POST",
            "/api/v1/admin/users",
            Some("admin"),
            Some(json!({"id": ADMIN_ID, "email": "owner@example.com", "role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let own = format!("/api/v1/admin/users/{}", ADMIN_ID);
    let (status, body) = h.call("PATCH", &own, Some("admin"), Some(json!({"role": "editor"}))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    let (status, _) = h.call("DELETE", &own, Some("admin"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
        .call(
            "POST",
            "/api/v1/admin/users",
            Some("admin"),
            Some(json!({"email": "Writer@Example.com", "role": "editor"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["email"], "writer@example.com");
    let editor = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = h.call("DELETE", &format!("/api/v1/admin/users/{}", editor), Some("admin"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    h.finish().await;
}
