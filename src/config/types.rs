//! Raw content-model types as they appear in the JSON files under `CONTENT_CONFIG_PATH`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A Postgres enum type, e.g. `site.article_status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableCheck {
    pub name: String,
    pub expression: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.as_str()],
            PrimaryKeyConfig::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub id: String,
    #[serde(default)]
    pub schema_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub primary_key: PrimaryKeyConfig,
    /// Unique constraints, each a list of column names (e.g. `[["slug"]]`).
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub check: Vec<TableCheck>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn base_name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    /// DDL spelling, e.g. `varchar(120)`.
    pub fn ddl(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.clone(),
            ColumnTypeConfig::Parameterized { name, params } => match params.as_deref() {
                Some(p) if !p.is_empty() => format!(
                    "{}({})",
                    name,
                    p.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
                ),
                _ => name.clone(),
            },
        }
    }
}

/// Column default: a literal string (`"0"`, `"'[]'::jsonb"`) or `{ "expression": "gen_random_uuid()" }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl ColumnDefaultConfig {
    pub fn sql(&self) -> &str {
        match self {
            ColumnDefaultConfig::Literal(s) => s,
            ColumnDefaultConfig::Expression { expression } => expression,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumnEntry {
    Name(String),
    Spec { name: String, direction: Option<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<IndexColumnEntry>,
    #[serde(default, rename = "where")]
    pub where_: Option<String>,
}

/// Foreign key `from_table.from_column -> to_table.to_column`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_table_id: String,
    pub from_column_id: String,
    pub to_table_id: String,
    pub to_column_id: String,
    #[serde(default)]
    pub on_delete: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// For JSON array columns: every element must be an object carrying these keys.
    #[serde(default)]
    pub item_keys: Option<Vec<String>>,
}

/// Exposure of one table over `/api/v1/content/{path_segment}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    pub entity_id: String,
    pub path_segment: String,
    pub operations: Vec<String>,
    /// RBAC resource name checked by `can_access`. Defaults to the path segment.
    #[serde(default)]
    pub resource: Option<String>,
    /// Anonymous callers may list and read published rows.
    #[serde(default)]
    pub public_read: bool,
    /// Boolean column (or enum column compared to `published`) gating anonymous reads.
    #[serde(default)]
    pub published_column: Option<String>,
    /// Unique slug column used by `/slug/{slug}` lookups.
    #[serde(default)]
    pub slug_column: Option<String>,
    /// Column the slug is derived from when a create omits it.
    #[serde(default)]
    pub slug_source: Option<String>,
    /// Default list order: a column name, `-` prefix for descending.
    #[serde(default)]
    pub default_order: Option<String>,
    /// Column names that must never be exposed in API responses.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

/// All content-model files in one struct.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FullConfig {
    pub schemas: Vec<SchemaConfig>,
    pub enums: Vec<EnumConfig>,
    pub tables: Vec<TableConfig>,
    pub columns: Vec<ColumnConfig>,
    pub indexes: Vec<IndexConfig>,
    pub relationships: Vec<RelationshipConfig>,
    pub api_entities: Vec<ApiEntityConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_default_accepts_literal_and_expression() {
        let lit: ColumnDefaultConfig = serde_json::from_str(r#""0""#).unwrap();
        assert_eq!(lit.sql(), "0");
        let expr: ColumnDefaultConfig = serde_json::from_str(r#"{"expression":"gen_random_uuid()"}"#).unwrap();
        assert_eq!(expr.sql(), "gen_random_uuid()");
    }

    #[test]
    fn parameterized_type_renders_params() {
        let ty: ColumnTypeConfig = serde_json::from_str(r#"{"name":"varchar","params":[120]}"#).unwrap();
        assert_eq!(ty.ddl(), "varchar(120)");
        assert_eq!(ty.base_name(), "varchar");
    }

    #[test]
    fn api_entity_flags_default_off() {
        let api: ApiEntityConfig =
            serde_json::from_str(r#"{"entity_id":"t_faqs","path_segment":"faqs","operations":["read"]}"#).unwrap();
        assert!(!api.public_read);
        assert!(api.slug_column.is_none());
        assert!(api.resource.is_none());
    }
}
