//! Content CRUD handlers over `/api/v1/content/:path_segment`: list, read, slug lookup,
//! create, update, delete, bulk create, batch update; plus the page FAQ listing.

use crate::audit::{self, AuditEntry};
use crate::auth::rbac::ResourceCategory;
use crate::auth::{authorize, has_permission, Action, AuthUser, MaybeAuthUser, Role};
use crate::case::object_to_column_map;
use crate::config::{OrderBy, PkType, ResolvedEntity};
use crate::error::AppError;
use crate::response::{success_many, success_many_created, success_one, success_one_ok, success_page};
use crate::service::{apply_slug, CrudService, RequestValidator};
use crate::slug::is_valid_slug;
use crate::sql::{IncludeSelect, ListQuery, MAX_LIMIT};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

const DEFAULT_LIMIT: u32 = 100;
pub const FAQS_PATH: &str = "faqs";
pub const FAQ_PAGES_PATH: &str = "faq-pages";
/// Column of the FAQ join table naming the page.
pub const FAQ_PAGE_COLUMN: &str = "page_slug";

/// Known entity whose `operations` include `op`; otherwise 404 / 405.
fn entity_for<'a>(state: &'a AppState, path_segment: &str, op: &str) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown content type '{}'", path_segment)))?;
    if !entity.allows(op) {
        return Err(AppError::MethodNotAllowed(format!("{} is not allowed on {}", op, path_segment)));
    }
    Ok(entity)
}

/// Decides whether the caller may read `entity` and whether they are limited to published rows.
/// Anonymous callers and plain `user`s only see published rows of public entities.
fn read_scope(state: &AppState, entity: &ResolvedEntity, caller: &MaybeAuthUser) -> Result<bool, AppError> {
    let Some(user) = &caller.0 else {
        return if entity.public_read {
            Ok(true)
        } else {
            Err(AppError::Unauthorized("Missing Authorization header".into()))
        };
    };
    authorize(state, user, &entity.resource, Action::Read)?;
    let category = ResourceCategory::of(&entity.resource);
    let full = user.role == Role::Admin || has_permission(user.role, &format!("{}:read", category.prefix()));
    if !full && !entity.public_read {
        return Err(AppError::insufficient_permissions());
    }
    Ok(!full)
}

fn parse_id(id_str: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(object_to_column_map(m)),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn body_to_items(value: Value) -> Result<Vec<HashMap<String, Value>>, AppError> {
    match value {
        Value::Array(arr) => arr.into_iter().map(body_to_map).collect(),
        _ => Err(AppError::BadRequest("body must be a JSON array of objects".into())),
    }
}

/// Query-string value typed by the column it filters. Values the column type
/// cannot hold are the client's error (400), not a failed cast in Postgres.
fn query_value_for_column(entity: &ResolvedEntity, col: &str, s: &str) -> Result<Value, AppError> {
    let column = entity.column(col);
    if s == "null" && column.map(|c| c.nullable).unwrap_or(false) {
        return Ok(Value::Null);
    }
    let pg_type = column.and_then(|c| c.pg_type.as_deref()).unwrap_or("text");
    let value = match pg_type {
        "integer" | "bigint" => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AppError::BadRequest(format!("{} must be an integer", col)))?,
        "numeric" | "double precision" => {
            s.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| AppError::BadRequest(format!("{} must be a number", col)))?;
            Value::String(s.to_string())
        }
        "boolean" if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        "boolean" if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        "boolean" => return Err(AppError::BadRequest(format!("{} must be true or false", col))),
        "uuid" => {
            uuid::Uuid::parse_str(s).map_err(|_| AppError::BadRequest(format!("{} must be a uuid", col)))?;
            Value::String(s.to_string())
        }
        _ => Value::String(s.to_string()),
    };
    Ok(value)
}

/// `?include=a,b` resolved against the entity's relationships. Related entities must be readable
/// in the same scope as the main one.
fn parse_includes<'a>(
    state: &'a AppState,
    entity: &'a ResolvedEntity,
    raw: Option<&str>,
    published_only: bool,
) -> Result<Vec<IncludeSelect<'a>>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let link = entity
            .include(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown include '{}'", name)))?;
        let related = state
            .model
            .entity_by_path(&link.related_path_segment)
            .ok_or_else(|| AppError::BadRequest(format!("unknown include '{}'", name)))?;
        if !related.allows("read") || (published_only && !related.public_read) {
            return Err(AppError::BadRequest(format!("include '{}' is not readable", name)));
        }
        out.push(IncludeSelect {
            name: link.name.as_str(),
            direction: link.direction.clone(),
            related,
            our_key: link.our_key_column.as_str(),
            their_key: link.their_key_column.as_str(),
        });
    }
    Ok(out)
}

pub async fn list(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let published_only = read_scope(&state, entity, &caller)?;

    let mut query = ListQuery {
        published_only,
        ..Default::default()
    };
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    for k in keys {
        let v = &params[k];
        match k.as_str() {
            "limit" => {
                let n: u32 = v.parse().map_err(|_| AppError::BadRequest("limit must be a number".into()))?;
                query.limit = Some(n.clamp(1, MAX_LIMIT));
            }
            "offset" => {
                query.offset = Some(v.parse().map_err(|_| AppError::BadRequest("offset must be a number".into()))?);
            }
            "order" => {
                let order = OrderBy::parse(v)
                    .filter(|o| entity.has_column(&o.column) && !entity.sensitive_columns.contains(&o.column))
                    .ok_or_else(|| AppError::BadRequest(format!("cannot order by '{}'", v)))?;
                query.order = Some(order);
            }
            "include" => {}
            col if entity.has_column(col) && !entity.sensitive_columns.contains(col) => {
                query.filters.push((col.to_string(), query_value_for_column(entity, col, v)?));
            }
            _ => {}
        }
    }
    query.includes = parse_includes(&state, entity, params.get("include").map(String::as_str), published_only)?;
    let limit = *query.limit.get_or_insert(DEFAULT_LIMIT);
    let offset = *query.offset.get_or_insert(0);

    let rows = CrudService::list(&state.pool, entity, &query).await?;
    Ok(success_page(rows, limit, offset))
}

pub async fn read(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let published_only = read_scope(&state, entity, &caller)?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let includes = parse_includes(&state, entity, params.get("include").map(String::as_str), published_only)?;
    let row = CrudService::read_by(&state.pool, entity, &entity.pk_columns[0], &id, published_only, &includes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", path_segment, id_str)))?;
    Ok(success_one_ok(row))
}

pub async fn read_by_slug(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path((path_segment, slug)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "read")?;
    let slug_column = entity
        .slug_column
        .as_deref()
        .ok_or_else(|| AppError::NotFound(format!("{} has no slugs", path_segment)))?;
    let published_only = read_scope(&state, entity, &caller)?;
    if !is_valid_slug(&slug) {
        return Err(AppError::NotFound(format!("{} {}", path_segment, slug)));
    }
    let includes = parse_includes(&state, entity, params.get("include").map(String::as_str), published_only)?;
    let row = CrudService::read_by(&state.pool, entity, slug_column, &Value::String(slug.clone()), published_only, &includes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", path_segment, slug)))?;
    Ok(success_one_ok(row))
}

fn row_id(entity: &ResolvedEntity, row: &Value) -> String {
    match row.get(&entity.pk_columns[0]) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "create")?;
    authorize(&state, &user, &entity.resource, Action::Write)?;
    let mut body = body_to_map(body)?;
    apply_slug(entity, &mut body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    let row = CrudService::create(&state.pool, entity, &body).await?;
    tracing::info!(entity = %path_segment, user_id = %user.user_id, "content created");
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_CREATE, &entity.path_segment)
            .actor(&user)
            .resource_id(row_id(entity, &row)),
    );
    Ok(success_one(row))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "update")?;
    authorize(&state, &user, &entity.resource, Action::Write)?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let mut body = body_to_map(body)?;
    if entity.slug_column.as_ref().is_some_and(|c| body.contains_key(c)) {
        apply_slug(entity, &mut body)?;
    }
    RequestValidator::validate_partial(&body, &entity.validation)?;
    let mut fields: Vec<&String> = body.keys().collect();
    fields.sort();
    let details = serde_json::json!({ "fields": fields });
    let row = CrudService::update(&state.pool, entity, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", path_segment, id_str)))?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_UPDATE, &entity.path_segment)
            .actor(&user)
            .resource_id(&id_str)
            .details(details),
    );
    Ok(success_one_ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "delete")?;
    authorize(&state, &user, &entity.resource, Action::Delete)?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    CrudService::delete(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", path_segment, id_str)))?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_DELETE, &entity.path_segment)
            .actor(&user)
            .resource_id(&id_str),
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "bulk_create")?;
    authorize(&state, &user, &entity.resource, Action::Write)?;
    let mut items = body_to_items(body)?;
    for (i, item) in items.iter_mut().enumerate() {
        apply_slug(entity, item)
            .and_then(|_| RequestValidator::validate(item, &entity.validation))
            .map_err(|e| match e {
                AppError::Validation(m) => AppError::Validation(format!("item {}: {}", i, m)),
                other => other,
            })?;
    }
    let rows = CrudService::bulk_create(&state.pool, entity, &items).await?;
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_BULK_CREATE, &entity.path_segment)
            .actor(&user)
            .details(serde_json::json!({ "count": rows.len() })),
    );
    Ok(success_many_created(rows))
}

pub async fn batch_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity_for(&state, &path_segment, "batch_update")?;
    authorize(&state, &user, &entity.resource, Action::Write)?;
    let items = body_to_items(body)?;
    let total = items.len();
    let outcome = CrudService::batch_update(&state.pool, entity, items).await?;
    tracing::info!(entity = %path_segment, total, errors = outcome.errors, "batch update finished");
    audit::record_detached(
        &state,
        AuditEntry::new(audit::ACTION_BATCH_UPDATE, &entity.path_segment)
            .actor(&user)
            .details(serde_json::json!({ "total": total, "updated": outcome.updated.len(), "errors": outcome.errors })),
    );
    Ok(success_one_ok(outcome))
}

/// Published FAQs assigned to a page, in FAQ display order. Public.
pub async fn page_faqs(State(state): State<AppState>, Path(page_slug): Path<String>) -> Result<impl IntoResponse, AppError> {
    if !is_valid_slug(&page_slug) {
        return Err(AppError::BadRequest(format!("invalid page slug '{}'", page_slug)));
    }
    let faqs = entity_for(&state, FAQS_PATH, "read")?;
    let pages = state
        .model
        .entity_by_path(FAQ_PAGES_PATH)
        .ok_or_else(|| AppError::NotFound(format!("unknown content type '{}'", FAQ_PAGES_PATH)))?;
    let link = faqs
        .include(FAQ_PAGES_PATH)
        .ok_or_else(|| AppError::NotFound("faqs are not linked to pages".into()))?;
    let rows = CrudService::list_via_join(
        &state.pool,
        faqs,
        pages,
        &link.their_key_column,
        FAQ_PAGE_COLUMN,
        &Value::String(page_slug),
        true,
    )
    .await?;
    Ok(success_many(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::fixtures::sample_config;
    use crate::config::resolve;
    use serde_json::json;

    #[test]
    fn ids_are_parsed_by_key_type() {
        assert!(parse_id("not-a-uuid", &PkType::Uuid).is_err());
        assert_eq!(parse_id("42", &PkType::BigInt).unwrap(), json!(42));
        assert_eq!(parse_id("home", &PkType::Text).unwrap(), json!("home"));
    }

    #[test]
    fn query_values_follow_column_types() {
        let model = resolve(&sample_config()).unwrap();
        let faqs = model.entity_by_path("faqs").unwrap();
        assert_eq!(query_value_for_column(faqs, "display_order", "3").unwrap(), json!(3));
        assert_eq!(query_value_for_column(faqs, "is_active", "TRUE").unwrap(), json!(true));
        assert_eq!(query_value_for_column(faqs, "question", "3").unwrap(), json!("3"));
    }

    #[test]
    fn unparsable_filters_are_bad_requests() {
        let model = resolve(&sample_config()).unwrap();
        let faqs = model.entity_by_path("faqs").unwrap();
        let err = query_value_for_column(faqs, "display_order", "abc").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "display_order must be an integer"));
        assert!(matches!(query_value_for_column(faqs, "is_active", "maybe"), Err(AppError::BadRequest(_))));
        assert!(matches!(query_value_for_column(faqs, "id", "not-a-uuid"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn camel_case_bodies_are_normalized() {
        let map = body_to_map(json!({"displayOrder": 2, "question": "Q"})).unwrap();
        assert_eq!(map["display_order"], json!(2));
        assert!(body_to_map(json!([1, 2])).is_err());
        assert!(body_to_items(json!({"a": 1})).is_err());
    }
}
