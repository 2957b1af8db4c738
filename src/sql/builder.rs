//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a resolved entity.

use crate::config::{ColumnInfo, IncludeDirection, OrderBy, ResolvedEntity};
use crate::sql::PgBindValue;
use serde_json::Value;
use std::collections::HashMap;

/// Alias of the main table in list queries.
const MAIN_ALIAS: &str = "main";
/// Hard cap on page size.
pub const MAX_LIMIT: u32 = 1000;
/// Value an enum/text publish column must hold for anonymous reads.
pub const PUBLISHED_VALUE: &str = "published";

/// One include for a list/read: embedded as a scalar subquery.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a ResolvedEntity,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// List parameters after the handler has parsed and checked them.
#[derive(Default)]
pub struct ListQuery<'a> {
    /// Exact-match filters; unknown columns are skipped.
    pub filters: Vec<(String, Value)>,
    pub order: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Restrict to rows visible to anonymous callers.
    pub published_only: bool,
    pub includes: Vec<IncludeSelect<'a>>,
}

/// Quote identifier for PostgreSQL. Identifiers only ever come from the content model.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its typed placeholder (`$3::uuid`).
    fn push(&mut self, v: &Value, column: Option<&ColumnInfo>) -> String {
        self.params.push(PgBindValue::for_column(v, column));
        let n = self.params.len();
        let cast = column.and_then(|c| c.pg_type.as_deref()).unwrap_or("text");
        format!("${}::{}", n, cast)
    }
}

/// Column reference as selected: enums and numerics come back as text.
fn select_expr(c: &ColumnInfo, alias: Option<&str>) -> String {
    let q = quoted(&c.name);
    let qualified = match alias {
        Some(a) => format!("{}.{}", a, q),
        None => q.clone(),
    };
    if c.is_enum() || c.pg_type.as_deref() == Some("numeric") {
        format!("{}::text AS {}", qualified, q)
    } else if alias.is_some() {
        format!("{} AS {}", qualified, q)
    } else {
        qualified
    }
}

fn select_column_list(entity: &ResolvedEntity, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .map(|c| select_expr(c, alias))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Predicate hiding unpublished rows. None when the entity has no publish column.
fn published_predicate(entity: &ResolvedEntity, alias: &str) -> Option<String> {
    let col = entity.column(entity.published_column.as_deref()?)?;
    let reference = format!("{}.{}", alias, quoted(&col.name));
    Some(if col.is_bool() {
        format!("{} IS TRUE", reference)
    } else {
        format!("{}::text = '{}'", reference, PUBLISHED_VALUE)
    })
}

fn order_clause(entity: &ResolvedEntity, order: Option<&OrderBy>, alias: &str) -> String {
    let pk = quoted(&entity.pk_columns[0]);
    let mut parts = Vec::new();
    if let Some(o) = order.or(entity.default_order.as_ref()) {
        if entity.has_column(&o.column) && o.column != entity.pk_columns[0] {
            let dir = if o.descending { "DESC NULLS LAST" } else { "ASC" };
            parts.push(format!("{}.{} {}", alias, quoted(&o.column), dir));
        }
    }
    parts.push(format!("{}.{}", alias, pk));
    format!(" ORDER BY {}", parts.join(", "))
}

fn include_subquery(inc: &IncludeSelect<'_>, published_only: bool) -> String {
    const SUB_ALIAS: &str = "rel";
    let rel_table = qualified_table(inc.related);
    let rel_cols = select_column_list(inc.related, Some(SUB_ALIAS));
    let mut cond = format!(
        "{}.{} = {}.{}",
        SUB_ALIAS,
        quoted(inc.their_key),
        MAIN_ALIAS,
        quoted(inc.our_key)
    );
    if published_only {
        if let Some(p) = published_predicate(inc.related, SUB_ALIAS) {
            cond.push_str(" AND ");
            cond.push_str(&p);
        }
    }
    let inner = format!("SELECT {} FROM {} {} WHERE {}", rel_cols, rel_table, SUB_ALIAS, cond);
    match inc.direction {
        IncludeDirection::ToOne => format!("(SELECT row_to_json(sub) FROM ({} LIMIT 1) sub)", inner),
        IncludeDirection::ToMany => format!(
            "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM ({}) sub)",
            inner
        ),
    }
}

/// SELECT list with filters, publish gate, includes, ORDER BY (requested, default, then PK), LIMIT/OFFSET.
pub fn select_list(entity: &ResolvedEntity, query: &ListQuery<'_>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in &query.includes {
        select_parts.push(format!("{} AS {}", include_subquery(inc, query.published_only), quoted(inc.name)));
    }

    let mut where_parts = Vec::new();
    for (col, val) in &query.filters {
        let Some(c) = entity.column(col) else { continue };
        if val.is_null() {
            where_parts.push(format!("{}.{} IS NULL", MAIN_ALIAS, quoted(col)));
        } else {
            let ph = q.push(val, Some(c));
            where_parts.push(format!("{}.{} = {}", MAIN_ALIAS, quoted(col), ph));
        }
    }
    if query.published_only {
        where_parts.extend(published_predicate(entity, MAIN_ALIAS));
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let limit_clause = query.limit.map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT))).unwrap_or_default();
    let offset_clause = query.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        qualified_table(entity),
        MAIN_ALIAS,
        where_clause,
        order_clause(entity, query.order.as_ref(), MAIN_ALIAS),
        limit_clause,
        offset_clause
    );
    q
}

/// SELECT one row where `column = value` (primary key or slug).
pub fn select_by_column(
    entity: &ResolvedEntity,
    column: &str,
    value: &Value,
    published_only: bool,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push(value, entity.column(column));
    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        select_parts.push(format!("{} AS {}", include_subquery(inc, published_only), quoted(inc.name)));
    }
    let mut where_parts = vec![format!("{}.{} = {}", MAIN_ALIAS, quoted(column), ph)];
    if published_only {
        where_parts.extend(published_predicate(entity, MAIN_ALIAS));
    }
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {} LIMIT 1",
        select_parts.join(", "),
        qualified_table(entity),
        MAIN_ALIAS,
        where_parts.join(" AND ")
    );
    q
}

/// Rows of `entity` linked through `join`: `entity.pk IN (SELECT join.fk FROM join WHERE join.filter_col = value)`.
pub fn select_via_join(
    entity: &ResolvedEntity,
    join: &ResolvedEntity,
    join_fk_column: &str,
    join_filter_column: &str,
    value: &Value,
    published_only: bool,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push(value, join.column(join_filter_column));
    let mut where_parts = vec![format!(
        "{}.{} IN (SELECT {} FROM {} WHERE {} = {})",
        MAIN_ALIAS,
        quoted(&entity.pk_columns[0]),
        quoted(join_fk_column),
        qualified_table(join),
        quoted(join_filter_column),
        ph
    )];
    if published_only {
        where_parts.extend(published_predicate(entity, MAIN_ALIAS));
    }
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {}{}",
        select_column_list(entity, Some(MAIN_ALIAS)),
        qualified_table(entity),
        MAIN_ALIAS,
        where_parts.join(" AND "),
        order_clause(entity, None, MAIN_ALIAS)
    );
    q
}

/// INSERT with RETURNING. Columns the body omits are skipped when they have a DB default.
/// The PK is only written when `include_pk` is set.
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>, include_pk: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        if c.pk_type.is_some() && !include_pk {
            continue;
        }
        let val = match body.get(&c.name) {
            Some(v) => v,
            None if c.has_default => continue,
            None => &Value::Null,
        };
        placeholders.push(q.push(val, Some(c)));
        cols.push(quoted(&c.name));
    }
    let returning = select_column_list(entity, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", qualified_table(entity), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            qualified_table(entity),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by primary key: SET only known, non-key columns present in the body; `updated_at` always bumps.
pub fn update(entity: &ResolvedEntity, id: &Value, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];
    let mut keys: Vec<&String> = body.keys().collect();
    keys.sort();
    let mut sets = Vec::new();
    for k in keys {
        if k == pk || k == "created_at" || k == "updated_at" {
            continue;
        }
        let Some(c) = entity.column(k) else { continue };
        let ph = q.push(&body[k], Some(c));
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let id_ph = q.push(id, entity.column(pk));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        sets.join(", "),
        quoted(pk),
        id_ph,
        select_column_list(entity, None)
    );
    q
}

/// DELETE by primary key with RETURNING.
pub fn delete(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];
    let ph = q.push(id, entity.column(pk));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        quoted(pk),
        ph,
        select_column_list(entity, None)
    );
    q
}
