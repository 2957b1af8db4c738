//! Apply the content model to the database: schemas, enum types, tables, indexes, foreign keys.
//! Run out-of-band by `cms-server migrate`; every step is idempotent so re-running is safe.

use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig, IMPLICIT_COLUMNS};
use crate::error::{AppError, ConfigError};
use crate::store;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Lookups shared by every DDL step.
struct Catalog<'a> {
    default_sid: &'a str,
    schema_names: HashMap<&'a str, &'a str>,
    tables_by_id: HashMap<&'a str, &'a TableConfig>,
    columns_by_id: HashMap<&'a str, &'a ColumnConfig>,
    /// Bare enum name -> `"schema"."name"`.
    enum_types: HashMap<&'a str, String>,
}

impl<'a> Catalog<'a> {
    fn new(config: &'a FullConfig) -> Result<Self, ConfigError> {
        let default_sid = default_schema_id(config)?;
        let schema_names: HashMap<&str, &str> =
            config.schemas.iter().map(|s| (s.id.as_str(), s.name.as_str())).collect();
        let mut enum_types = HashMap::new();
        for e in &config.enums {
            let sid = e.schema_id.as_deref().unwrap_or(default_sid);
            let schema = schema_names.get(sid).ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            })?;
            enum_types.insert(e.name.as_str(), format!("{}.{}", quote(schema), quote(&e.name)));
        }
        Ok(Catalog {
            default_sid,
            schema_names,
            tables_by_id: config.tables.iter().map(|t| (t.id.as_str(), t)).collect(),
            columns_by_id: config.columns.iter().map(|c| (c.id.as_str(), c)).collect(),
            enum_types,
        })
    }

    fn schema_of(&self, schema_id: Option<&str>) -> Result<&'a str, ConfigError> {
        let sid = schema_id.unwrap_or(self.default_sid);
        self.schema_names
            .get(sid)
            .copied()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: sid.to_string(),
            })
    }

    fn table(&self, table_id: &str) -> Result<&'a TableConfig, ConfigError> {
        self.tables_by_id
            .get(table_id)
            .copied()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: table_id.to_string(),
            })
    }

    fn column(&self, column_id: &str) -> Result<&'a ColumnConfig, ConfigError> {
        self.columns_by_id
            .get(column_id)
            .copied()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "column",
                id: column_id.to_string(),
            })
    }

    fn qualified_table(&self, table: &TableConfig) -> Result<String, ConfigError> {
        Ok(format!("{}.{}", quote(self.schema_of(table.schema_id.as_deref())?), quote(&table.name)))
    }

    /// Column type as DDL; bare enum names are schema-qualified.
    fn column_type(&self, ty: &ColumnTypeConfig) -> String {
        match self.enum_types.get(ty.base_name()) {
            Some(qualified) => qualified.clone(),
            None => ty.ddl(),
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for one table, including implicit timestamps, unique and check constraints.
fn create_table_sql(catalog: &Catalog<'_>, table: &TableConfig, columns: &[&ColumnConfig]) -> Result<String, ConfigError> {
    let mut defs = Vec::new();
    for c in columns {
        let mut def = format!("{} {}", quote(&c.name), catalog.column_type(&c.type_));
        if !c.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(d) = &c.default {
            def.push_str(" DEFAULT ");
            def.push_str(d.sql());
        }
        defs.push(def);
    }
    let declared: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    for name in IMPLICIT_COLUMNS {
        if !declared.contains(name) {
            defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quote(name)));
        }
    }
    let pk: Vec<String> = table.primary_key.columns().into_iter().map(quote).collect();
    defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    for u in &table.unique {
        let cols: Vec<String> = u.iter().map(|s| quote(s)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    for ch in &table.check {
        defs.push(format!("CONSTRAINT {} CHECK ({})", quote(&ch.name), ch.expression));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        catalog.qualified_table(table)?,
        defs.join(",\n  ")
    ))
}

fn create_index_sql(catalog: &Catalog<'_>, idx: &IndexConfig) -> Result<String, ConfigError> {
    let table = catalog.table(&idx.table_id)?;
    let cols: Vec<String> = idx
        .columns
        .iter()
        .map(|col| match col {
            IndexColumnEntry::Name(n) => quote(n),
            IndexColumnEntry::Spec { name, direction } => match direction.as_deref() {
                Some(d) if d.eq_ignore_ascii_case("desc") => format!("{} DESC", quote(name)),
                _ => quote(name),
            },
        })
        .collect();
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let where_clause = idx.where_.as_ref().map(|w| format!(" WHERE {}", w)).unwrap_or_default();
    Ok(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({}){}",
        unique,
        quote(&idx.name),
        catalog.qualified_table(table)?,
        cols.join(", "),
        where_clause
    ))
}

fn foreign_key_sql(catalog: &Catalog<'_>, rel: &RelationshipConfig) -> Result<String, ConfigError> {
    let from_table = catalog.table(&rel.from_table_id)?;
    let to_table = catalog.table(&rel.to_table_id)?;
    let from_col = catalog.column(&rel.from_column_id)?;
    let to_col = catalog.column(&rel.to_column_id)?;
    let on_delete = match rel.on_delete.as_deref().map(str::to_ascii_uppercase).as_deref() {
        Some("CASCADE") => "CASCADE",
        Some("SET NULL") => "SET NULL",
        Some("RESTRICT") => "RESTRICT",
        _ => "NO ACTION",
    };
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
        catalog.qualified_table(from_table)?,
        quote(&rel.id),
        quote(&from_col.name),
        catalog.qualified_table(to_table)?,
        quote(&to_col.name),
        on_delete
    ))
}

/// Apply the content model, then the fixed system tables, and record the model checksum.
/// Returns the names of the content tables touched.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig, system_schema: &str) -> Result<Vec<String>, AppError> {
    validate(config)?;
    let catalog = Catalog::new(config)?;

    for s in &config.schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(&s.name)))
            .execute(pool)
            .await?;
        if let Some(comment) = &s.comment {
            sqlx::query(&format!("COMMENT ON SCHEMA {} IS {}", quote(&s.name), literal(comment)))
                .execute(pool)
                .await?;
        }
    }

    for e in &config.enums {
        let schema = catalog.schema_of(e.schema_id.as_deref())?;
        let exists: (Option<String>,) = sqlx::query_as("SELECT to_regtype($1)::text")
            .bind(format!("{}.{}", quote(schema), quote(&e.name)))
            .fetch_one(pool)
            .await?;
        if exists.0.is_some() {
            for v in &e.values {
                sqlx::query(&format!(
                    "ALTER TYPE {}.{} ADD VALUE IF NOT EXISTS {}",
                    quote(schema),
                    quote(&e.name),
                    literal(v)
                ))
                .execute(pool)
                .await?;
            }
            continue;
        }
        let values: Vec<String> = e.values.iter().map(|v| literal(v)).collect();
        sqlx::query(&format!(
            "CREATE TYPE {}.{} AS ENUM ({})",
            quote(schema),
            quote(&e.name),
            values.join(", ")
        ))
        .execute(pool)
        .await?;
        tracing::info!(schema, name = %e.name, "created enum type");
    }

    let mut columns_by_table: HashMap<&str, Vec<&ColumnConfig>> = HashMap::new();
    for c in &config.columns {
        columns_by_table.entry(c.table_id.as_str()).or_default().push(c);
    }
    let mut touched = Vec::new();
    for t in &config.tables {
        let cols = columns_by_table.get(t.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        sqlx::query(&create_table_sql(&catalog, t, cols)?).execute(pool).await?;
        if let Some(comment) = &t.comment {
            sqlx::query(&format!(
                "COMMENT ON TABLE {} IS {}",
                catalog.qualified_table(t)?,
                literal(comment)
            ))
            .execute(pool)
            .await?;
        }
        touched.push(t.name.clone());
    }

    for idx in &config.indexes {
        sqlx::query(&create_index_sql(&catalog, idx)?).execute(pool).await?;
    }

    for rel in &config.relationships {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_constraint WHERE conname = $1)")
            .bind(&rel.id)
            .fetch_one(pool)
            .await?;
        if exists.0 {
            continue;
        }
        sqlx::query(&foreign_key_sql(&catalog, rel)?).execute(pool).await?;
    }

    store::ensure_system_tables(pool, system_schema).await?;
    let checksum = store::model_checksum(config)?;
    store::record_schema_version(pool, system_schema, &checksum, &touched).await?;
    tracing::info!(tables = touched.len(), %checksum, "content model applied");
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::fixtures::sample_config;

    #[test]
    fn table_ddl_adds_timestamps_and_qualifies_enums() {
        let config = sample_config();
        let catalog = Catalog::new(&config).unwrap();
        let news = config.tables.iter().find(|t| t.id == "t_news").unwrap();
        let cols: Vec<&ColumnConfig> = config.columns.iter().filter(|c| c.table_id == "t_news").collect();
        let sql = create_table_sql(&catalog, news, &cols).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"site\".\"news_articles\""));
        assert!(sql.contains("\"site\".\"article_status\""));
        assert!(sql.contains("\"created_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("\"updated_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn foreign_key_ddl_names_both_tables() {
        let config = sample_config();
        let catalog = Catalog::new(&config).unwrap();
        let sql = foreign_key_sql(&catalog, &config.relationships[0]).unwrap();
        assert!(sql.contains("ALTER TABLE \"site\".\"faq_pages\""));
        assert!(sql.contains("REFERENCES \"site\".\"faqs\" (\"id\")"));
        assert!(sql.contains("ON DELETE CASCADE"));
    }
}
