//! Resolved content model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// A field's validation rule with its `pattern` compiled once, when the model resolves.
#[derive(Clone, Debug, Default)]
pub struct FieldRule {
    pub rule: ValidationRule,
    pub pattern: Option<Regex>,
}

impl FieldRule {
    pub fn compile(entity: &str, column: &str, rule: &ValidationRule) -> Result<FieldRule, ConfigError> {
        let pattern = rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                ConfigError::Validation(format!("entity '{}': invalid pattern for {}: {}", entity, column, e))
            })?;
        Ok(FieldRule {
            rule: rule.clone(),
            pattern,
        })
    }
}

/// to_one: we hold the FK. to_many: they hold an FK to us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// A related entity that `?include=` can embed. `name` is the related path segment.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    pub name: String,
    pub direction: IncludeDirection,
    pub related_path_segment: String,
    /// Our FK for to_one, our key for to_many.
    pub our_key_column: String,
    /// Their key for to_one, their FK for to_many.
    pub their_key_column: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub pk_type: Option<PkType>,
    pub nullable: bool,
    pub has_default: bool,
    /// Postgres type used as a bind cast (`$1::timestamptz`); `None` binds untyped.
    pub pg_type: Option<String>,
}

impl ColumnInfo {
    pub fn is_enum(&self) -> bool {
        self.pg_type.as_deref().map(|t| t.contains('.')).unwrap_or(false)
    }

    pub fn is_bool(&self) -> bool {
        self.pg_type.as_deref() == Some("boolean")
    }
}

/// Sort key for list queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    /// Parses `col` or `-col`.
    pub fn parse(raw: &str) -> Option<OrderBy> {
        let raw = raw.trim();
        let (column, descending) = match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        if column.is_empty() {
            return None;
        }
        Some(OrderBy {
            column: column.to_string(),
            descending,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub table_id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    /// RBAC resource name.
    pub resource: String,
    pub pk_columns: Vec<String>,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    pub public_read: bool,
    pub published_column: Option<String>,
    pub slug_column: Option<String>,
    pub slug_source: Option<String>,
    pub default_order: Option<OrderBy>,
    pub sensitive_columns: HashSet<String>,
    pub includes: Vec<IncludeSpec>,
    pub validation: HashMap<String, FieldRule>,
}

impl ResolvedEntity {
    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }

    /// Drops sensitive columns from a row before it leaves the API.
    pub fn redact(&self, row: &mut serde_json::Value) {
        if self.sensitive_columns.is_empty() {
            return;
        }
        if let serde_json::Value::Object(map) = row {
            for col in &self.sensitive_columns {
                map.remove(col);
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    pub fn path_segments(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.path_segment.as_str()).collect()
    }
}
