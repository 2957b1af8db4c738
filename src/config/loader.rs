//! Load the content model from JSON files and resolve it for runtime use.

use crate::config::resolved::{ColumnInfo, FieldRule, IncludeDirection, IncludeSpec, OrderBy, PkType, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig, IMPLICIT_COLUMNS};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let columns_by_table: HashMap<&str, Vec<&ColumnConfig>> =
        config.columns.iter().fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let column_id_to_name: HashMap<&str, &str> =
        config.columns.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    let table_id_to_path: HashMap<&str, &str> = config
        .api_entities
        .iter()
        .map(|api| (api.entity_id.as_str(), api.path_segment.as_str()))
        .collect();
    let enum_types: HashMap<&str, String> = config
        .enums
        .iter()
        .filter_map(|e| {
            let sid = e.schema_id.as_deref().unwrap_or(default_sid);
            schemas_by_id
                .get(sid)
                .map(|s| (e.name.as_str(), format!("{}.{}", s.name, e.name)))
        })
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table.get(table.id.as_str()).map(|v| v.as_slice()).unwrap_or(&[]);

        let pk_names: Vec<String> = table.primary_key.columns().into_iter().map(str::to_string).collect();
        let pk_col = table_columns
            .iter()
            .find(|c| c.name == pk_names[0])
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                table_id: table.id.clone(),
                column: pk_names[0].clone(),
            })?;
        let pk_type = infer_pk_type(pk_col);

        let mut columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                pk_type: pk_names.contains(&c.name).then(|| pk_type.clone()),
                nullable: c.nullable,
                has_default: c.default.is_some(),
                pg_type: column_pg_type_name(&c.type_, &enum_types),
            })
            .collect();

        let declared: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        for name in IMPLICIT_COLUMNS {
            if !declared.contains(*name) {
                columns.push(ColumnInfo {
                    name: name.to_string(),
                    pk_type: None,
                    nullable: false,
                    has_default: true,
                    pg_type: Some("timestamptz".into()),
                });
            }
        }

        let validation = api
            .validation
            .iter()
            .map(|(col, rule)| Ok((col.clone(), FieldRule::compile(&api.path_segment, col, rule)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        let includes = build_includes_for_table(&table.id, &config.relationships, &column_id_to_name, &table_id_to_path);
        let entity = ResolvedEntity {
            table_id: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            resource: api.resource.clone().unwrap_or_else(|| api.path_segment.clone()),
            pk_columns: pk_names,
            pk_type,
            columns,
            operations: api.operations.clone(),
            public_read: api.public_read,
            published_column: api.published_column.clone(),
            slug_column: api.slug_column.clone(),
            slug_source: api.slug_source.clone(),
            default_order: api.default_order.as_deref().and_then(OrderBy::parse),
            sensitive_columns: api.sensitive_columns.iter().cloned().collect(),
            includes,
            validation,
        };
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    tracing::debug!(entities = entities.len(), "content model resolved");
    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn build_includes_for_table(
    our_table_id: &str,
    relationships: &[RelationshipConfig],
    column_id_to_name: &HashMap<&str, &str>,
    table_id_to_path: &HashMap<&str, &str>,
) -> Vec<IncludeSpec> {
    let mut includes = Vec::new();
    for rel in relationships {
        let (Some(from_col), Some(to_col)) = (
            column_id_to_name.get(rel.from_column_id.as_str()),
            column_id_to_name.get(rel.to_column_id.as_str()),
        ) else {
            continue;
        };
        if rel.from_table_id == our_table_id {
            if let Some(related) = table_id_to_path.get(rel.to_table_id.as_str()) {
                includes.push(IncludeSpec {
                    name: related.to_string(),
                    direction: IncludeDirection::ToOne,
                    related_path_segment: related.to_string(),
                    our_key_column: from_col.to_string(),
                    their_key_column: to_col.to_string(),
                });
            }
        }
        if rel.to_table_id == our_table_id {
            if let Some(related) = table_id_to_path.get(rel.from_table_id.as_str()) {
                includes.push(IncludeSpec {
                    name: related.to_string(),
                    direction: IncludeDirection::ToMany,
                    related_path_segment: related.to_string(),
                    our_key_column: to_col.to_string(),
                    their_key_column: from_col.to_string(),
                });
            }
        }
    }
    includes
}

/// Postgres type used as a bind cast for this column.
fn column_pg_type_name(ty: &ColumnTypeConfig, enum_types: &HashMap<&str, String>) -> Option<String> {
    let name = ty.base_name();
    if let Some(qualified) = enum_types.get(name) {
        return Some(qualified.clone());
    }
    if name.contains('.') {
        return Some(name.to_string());
    }
    let lower = name.to_lowercase();
    let cast = match lower.as_str() {
        "timestamptz" | "timestamp with time zone" => "timestamptz",
        "timestamp" | "timestamp without time zone" => "timestamp",
        "date" => "date",
        "uuid" => "uuid",
        "bool" | "boolean" => "boolean",
        "jsonb" => "jsonb",
        "json" => "json",
        "smallint" | "int2" | "integer" | "int" | "int4" | "serial" => "integer",
        "bigint" | "int8" | "bigserial" => "bigint",
        "numeric" | "decimal" => "numeric",
        "real" | "float4" | "double precision" | "float8" => "double precision",
        _ => return None,
    };
    Some(cast.to_string())
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let lower = col.type_.base_name().to_lowercase();
    if lower.contains("uuid") {
        PkType::Uuid
    } else if lower.contains("bigserial") || lower.contains("bigint") {
        PkType::BigInt
    } else if lower.contains("serial") || lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

/// Read the content model from `dir`. Every file except `schemas.json` and `tables.json` is optional.
pub async fn load_from_dir(dir: &Path) -> Result<FullConfig, ConfigError> {
    Ok(FullConfig {
        schemas: read_json(dir, "schemas.json", true).await?,
        enums: read_json(dir, "enums.json", false).await?,
        tables: read_json(dir, "tables.json", true).await?,
        columns: read_json(dir, "columns.json", true).await?,
        indexes: read_json(dir, "indexes.json", false).await?,
        relationships: read_json(dir, "relationships.json", false).await?,
        api_entities: read_json(dir, "api_entities.json", false).await?,
    })
}

async fn read_json<T>(dir: &Path, file: &str, required: bool) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let path = dir.join(file);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "optional content model file absent");
            return Ok(Vec::new());
        }
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::config::types::*;

    /// A small model: site schema, faqs + faq_pages join, news articles with an enum status.
    pub(crate) fn sample_config() -> FullConfig {
        serde_json::from_value::<SampleFiles>(serde_json::json!({
            "schemas": [{"id": "site", "name": "site"}],
            "enums": [{"id": "e_status", "name": "article_status", "values": ["draft", "published", "archived"]}],
            "tables": [
                {"id": "t_faqs", "name": "faqs", "primary_key": "id"},
                {"id": "t_faq_pages", "name": "faq_pages", "primary_key": "id", "unique": [["faq_id", "page_slug"]]},
                {"id": "t_news", "name": "news_articles", "primary_key": "id", "unique": [["slug"]]}
            ],
            "columns": [
                {"id": "faqs.id", "table_id": "t_faqs", "name": "id", "type": "uuid", "nullable": false, "default": {"expression": "gen_random_uuid()"}},
                {"id": "faqs.question", "table_id": "t_faqs", "name": "question", "type": "text", "nullable": false},
                {"id": "faqs.answer", "table_id": "t_faqs", "name": "answer", "type": "text", "nullable": false},
                {"id": "faqs.display_order", "table_id": "t_faqs", "name": "display_order", "type": "integer", "default": "0"},
                {"id": "faqs.is_active", "table_id": "t_faqs", "name": "is_active", "type": "boolean", "default": "true"},
                {"id": "fp.id", "table_id": "t_faq_pages", "name": "id", "type": "uuid", "nullable": false, "default": {"expression": "gen_random_uuid()"}},
                {"id": "fp.faq_id", "table_id": "t_faq_pages", "name": "faq_id", "type": "uuid", "nullable": false},
                {"id": "fp.page_slug", "table_id": "t_faq_pages", "name": "page_slug", "type": "text", "nullable": false},
                {"id": "news.id", "table_id": "t_news", "name": "id", "type": "uuid", "nullable": false, "default": {"expression": "gen_random_uuid()"}},
                {"id": "news.title", "table_id": "t_news", "name": "title", "type": "text", "nullable": false},
                {"id": "news.slug", "table_id": "t_news", "name": "slug", "type": "text", "nullable": false},
                {"id": "news.status", "table_id": "t_news", "name": "status", "type": "article_status", "default": "'draft'"},
                {"id": "news.tags", "table_id": "t_news", "name": "tags", "type": "jsonb", "default": "'[]'::jsonb"},
                {"id": "news.author_email", "table_id": "t_news", "name": "author_email", "type": "text"},
                {"id": "news.published_at", "table_id": "t_news", "name": "published_at", "type": "timestamptz"}
            ],
            "relationships": [
                {"id": "fk_faq_pages_faq", "from_table_id": "t_faq_pages", "from_column_id": "fp.faq_id", "to_table_id": "t_faqs", "to_column_id": "faqs.id", "on_delete": "CASCADE"}
            ],
            "api_entities": [
                {"entity_id": "t_faqs", "path_segment": "faqs", "operations": ["create", "read", "update", "delete", "batch_update"],
                 "public_read": true, "published_column": "is_active", "default_order": "display_order",
                 "validation": {"question": {"required": true, "max_length": 500}}},
                {"entity_id": "t_faq_pages", "path_segment": "faq-pages", "operations": ["create", "read", "delete"], "resource": "faqs"},
                {"entity_id": "t_news", "path_segment": "news-articles", "operations": ["create", "read", "update", "delete", "bulk_create"],
                 "public_read": true, "published_column": "status", "slug_column": "slug", "slug_source": "title",
                 "default_order": "-published_at", "sensitive_columns": ["author_email"]}
            ]
        }))
        .unwrap()
        .into_config()
    }

    #[derive(serde::Deserialize)]
    struct SampleFiles {
        schemas: Vec<SchemaConfig>,
        enums: Vec<EnumConfig>,
        tables: Vec<TableConfig>,
        columns: Vec<ColumnConfig>,
        relationships: Vec<RelationshipConfig>,
        api_entities: Vec<ApiEntityConfig>,
    }

    impl SampleFiles {
        fn into_config(self) -> FullConfig {
            FullConfig {
                schemas: self.schemas,
                enums: self.enums,
                tables: self.tables,
                columns: self.columns,
                indexes: Vec::new(),
                relationships: self.relationships,
                api_entities: self.api_entities,
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_config;
    use super::*;

    #[test]
    fn resolves_entities_with_implicit_timestamps() {
        let model = resolve(&sample_config()).unwrap();
        let faqs = model.entity_by_path("faqs").unwrap();
        assert_eq!(faqs.pk_type, PkType::Uuid);
        assert!(faqs.has_column("created_at"));
        assert!(faqs.has_column("updated_at"));
        assert_eq!(faqs.resource, "faqs");
        assert_eq!(faqs.default_order, Some(OrderBy { column: "display_order".into(), descending: false }));
        assert_eq!(faqs.column("display_order").unwrap().pg_type.as_deref(), Some("integer"));
    }

    #[test]
    fn enum_columns_get_qualified_cast() {
        let model = resolve(&sample_config()).unwrap();
        let news = model.entity_by_path("news-articles").unwrap();
        let status = news.column("status").unwrap();
        assert_eq!(status.pg_type.as_deref(), Some("site.article_status"));
        assert!(status.is_enum());
    }

    #[test]
    fn relationship_yields_includes_in_both_directions() {
        let model = resolve(&sample_config()).unwrap();
        let faqs = model.entity_by_path("faqs").unwrap();
        let inc = faqs.include("faq-pages").unwrap();
        assert_eq!(inc.direction, IncludeDirection::ToMany);
        assert_eq!(inc.our_key_column, "id");
        assert_eq!(inc.their_key_column, "faq_id");

        let pages = model.entity_by_path("faq-pages").unwrap();
        let back = pages.include("faqs").unwrap();
        assert_eq!(back.direction, IncludeDirection::ToOne);
        assert_eq!(back.our_key_column, "faq_id");
        assert_eq!(pages.resource, "faqs");
    }

    #[test]
    fn duplicate_path_segment_is_rejected() {
        let mut config = sample_config();
        let mut dup = config.api_entities[0].clone();
        dup.entity_id = "t_news".into();
        config.api_entities.push(dup);
        assert!(matches!(resolve(&config), Err(ConfigError::DuplicatePathSegment(p)) if p == "faqs"));
    }

    #[test]
    fn unknown_slug_column_is_rejected() {
        let mut config = sample_config();
        config.api_entities[2].slug_column = Some("permalink".into());
        assert!(matches!(resolve(&config), Err(ConfigError::UnknownColumn { column, .. }) if column == "permalink"));
    }

    #[test]
    fn reserved_resource_is_rejected() {
        let mut config = sample_config();
        config.api_entities[0].resource = Some("users".into());
        assert!(matches!(resolve(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let mut config = sample_config();
        config.api_entities[0].operations.push("truncate".into());
        assert!(resolve(&config).is_err());
    }

    #[test]
    fn redact_strips_sensitive_columns() {
        let model = resolve(&sample_config()).unwrap();
        let news = model.entity_by_path("news-articles").unwrap();
        let mut row = serde_json::json!({"title": "t", "author_email": "a@b.c"});
        news.redact(&mut row);
        assert!(row.get("author_email").is_none());
        assert_eq!(row["title"], "t");
    }

    #[test]
    fn patterns_compile_once_at_resolve() {
        let mut config = sample_config();
        let rules = &mut config.api_entities[0].validation;
        rules.get_mut("question").unwrap().pattern = Some("^[A-Z]".into());
        let model = resolve(&config).unwrap();
        let faqs = model.entity_by_path("faqs").unwrap();
        assert!(faqs.validation["question"].pattern.as_ref().unwrap().is_match("What?"));

        config.api_entities[0].validation.get_mut("question").unwrap().pattern = Some("(".into());
        let err = resolve(&config).unwrap_err();
        assert!(err.to_string().contains("question"));
    }
}
