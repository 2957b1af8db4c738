//! Content-model validation: referential integrity and API consistency.

use crate::auth::rbac::ResourceCategory;
use crate::config::{FullConfig, OrderBy};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Operations an api entity may list in `operations`.
pub const KNOWN_OPERATIONS: &[&str] = &["create", "read", "update", "delete", "bulk_create", "batch_update"];

/// Timestamp columns every content table gets even when the model omits them.
pub const IMPLICIT_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Schema id used when a table or enum omits `schema_id`: the first declared schema.
pub fn default_schema_id(config: &FullConfig) -> Result<&str, ConfigError> {
    config
        .schemas
        .first()
        .map(|s| s.id.as_str())
        .ok_or_else(|| ConfigError::Validation("at least one schema required".into()))
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let default_sid = default_schema_id(config)?;
    let schema_ids: HashSet<&str> = config.schemas.iter().map(|s| s.id.as_str()).collect();
    let table_ids: HashSet<&str> = config.tables.iter().map(|t| t.id.as_str()).collect();
    let column_ids: HashSet<&str> = config.columns.iter().map(|c| c.id.as_str()).collect();

    let mut columns_by_table: HashMap<&str, HashSet<&str>> = HashMap::new();
    for c in &config.columns {
        if !table_ids.contains(c.table_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: c.table_id.clone(),
            });
        }
        columns_by_table.entry(c.table_id.as_str()).or_default().insert(c.name.as_str());
    }

    for e in &config.enums {
        let sid = e.schema_id.as_deref().unwrap_or(default_sid);
        if !schema_ids.contains(sid) {
            return Err(ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            });
        }
        if e.values.is_empty() {
            return Err(ConfigError::Validation(format!("enum '{}' has no values", e.id)));
        }
    }

    for t in &config.tables {
        let sid = t.schema_id.as_deref().unwrap_or(default_sid);
        if !schema_ids.contains(sid) {
            return Err(ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            });
        }
        let table_columns = columns_by_table.get(t.id.as_str()).cloned().unwrap_or_default();
        for pk in t.primary_key.columns() {
            if !table_columns.contains(pk) {
                return Err(ConfigError::InvalidPrimaryKey {
                    table_id: t.id.clone(),
                    column: pk.to_string(),
                });
            }
        }
        for unique in &t.unique {
            for col in unique {
                if !table_columns.contains(col.as_str()) {
                    return Err(ConfigError::UnknownColumn {
                        entity: t.id.clone(),
                        column: col.clone(),
                    });
                }
            }
        }
    }

    for idx in &config.indexes {
        if !table_ids.contains(idx.table_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: idx.table_id.clone(),
            });
        }
    }

    for r in &config.relationships {
        if !table_ids.contains(r.from_table_id.as_str())
            || !table_ids.contains(r.to_table_id.as_str())
            || !column_ids.contains(r.from_column_id.as_str())
            || !column_ids.contains(r.to_column_id.as_str())
        {
            return Err(ConfigError::MissingReference {
                kind: "relationship",
                id: r.id.clone(),
            });
        }
    }

    let mut path_segments = HashSet::new();
    for api in &config.api_entities {
        if !table_ids.contains(api.entity_id.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            });
        }
        if !path_segments.insert(api.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(api.path_segment.clone()));
        }
        for op in &api.operations {
            if !KNOWN_OPERATIONS.contains(&op.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "entity '{}': unknown operation '{}'",
                    api.path_segment, op
                )));
            }
        }
        let resource = api.resource.as_deref().unwrap_or(&api.path_segment);
        if matches!(
            ResourceCategory::of(resource),
            ResourceCategory::Users | ResourceCategory::Security
        ) {
            return Err(ConfigError::Validation(format!(
                "entity '{}': resource '{}' is reserved",
                api.path_segment, resource
            )));
        }

        let table_columns = columns_by_table.get(api.entity_id.as_str()).cloned().unwrap_or_default();
        let known = |col: &str| table_columns.contains(col) || IMPLICIT_COLUMNS.contains(&col);
        let order_col = api
            .default_order
            .as_deref()
            .map(|raw| {
                OrderBy::parse(raw).map(|o| o.column).ok_or_else(|| {
                    ConfigError::Validation(format!("entity '{}': empty default_order", api.path_segment))
                })
            })
            .transpose()?;
        let referenced = [
            api.published_column.clone(),
            api.slug_column.clone(),
            api.slug_source.clone(),
            order_col,
        ];
        for col in referenced.iter().flatten().chain(api.validation.keys()).chain(api.sensitive_columns.iter()) {
            if !known(col) {
                return Err(ConfigError::UnknownColumn {
                    entity: api.path_segment.clone(),
                    column: col.clone(),
                });
            }
        }
        for (col, rule) in &api.validation {
            if let Some(pattern) = &rule.pattern {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::Validation(format!(
                        "entity '{}': invalid pattern for {}: {}",
                        api.path_segment, col, e
                    ))
                })?;
            }
        }
        if api.slug_source.is_some() && api.slug_column.is_none() {
            return Err(ConfigError::Validation(format!(
                "entity '{}': slug_source requires slug_column",
                api.path_segment
            )));
        }
        if api.public_read && !api.operations.iter().any(|o| o == "read") {
            return Err(ConfigError::Validation(format!(
                "entity '{}': public_read requires the read operation",
                api.path_segment
            )));
        }
    }

    Ok(())
}
