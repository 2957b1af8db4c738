//! Convert serde_json::Value to values sqlx can bind.

use crate::config::ColumnInfo;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A bindable parameter. Every variant goes over the wire as TEXT and the
/// `$n::type` cast the builder emits does the conversion, so a statement's
/// parameter types never depend on the values bound to it.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PgBindValue::I64(i),
                None => PgBindValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    /// Like [`PgBindValue::from_json`], but json/jsonb columns always receive the value as JSON,
    /// so a bare string stored into a jsonb column is encoded rather than parsed.
    pub fn for_column(v: &Value, column: Option<&ColumnInfo>) -> Self {
        let is_json = column
            .and_then(|c| c.pg_type.as_deref())
            .map(|t| t == "jsonb" || t == "json")
            .unwrap_or(false);
        if is_json && !v.is_null() {
            PgBindValue::Json(v.clone())
        } else {
            Self::from_json(v)
        }
    }

    /// Text form sent to Postgres; `None` binds SQL NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            PgBindValue::Null => None,
            PgBindValue::Bool(b) => Some(b.to_string()),
            PgBindValue::I64(n) => Some(n.to_string()),
            PgBindValue::F64(n) => Some(n.to_string()),
            PgBindValue::String(s) => Some(s.clone()),
            PgBindValue::Json(v) => Some(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self.as_text() {
            Some(text) => <&str as Encode<Postgres>>::encode_by_ref(&text.as_str(), buf),
            None => Ok(IsNull::Yes),
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(pg_type: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            name: "c".into(),
            pk_type: None,
            nullable: true,
            has_default: false,
            pg_type: pg_type.map(str::to_string),
        }
    }

    #[test]
    fn numbers_split_into_int_and_float() {
        assert_eq!(PgBindValue::from_json(&json!(7)), PgBindValue::I64(7));
        assert_eq!(PgBindValue::from_json(&json!(4.5)), PgBindValue::F64(4.5));
    }

    #[test]
    fn json_columns_keep_scalars_as_json() {
        let jsonb = col(Some("jsonb"));
        assert_eq!(PgBindValue::for_column(&json!("x"), Some(&jsonb)), PgBindValue::Json(json!("x")));
        assert_eq!(PgBindValue::for_column(&Value::Null, Some(&jsonb)), PgBindValue::Null);
        let text = col(None);
        assert_eq!(PgBindValue::for_column(&json!("x"), Some(&text)), PgBindValue::String("x".into()));
        assert_eq!(PgBindValue::for_column(&json!(["a"]), Some(&text)), PgBindValue::Json(json!(["a"])));
    }

    #[test]
    fn every_value_is_sent_as_text() {
        assert_eq!(PgBindValue::I64(100).as_text().as_deref(), Some("100"));
        assert_eq!(PgBindValue::F64(99.5).as_text().as_deref(), Some("99.5"));
        assert_eq!(PgBindValue::Bool(true).as_text().as_deref(), Some("true"));
        assert_eq!(PgBindValue::Json(json!(["a", 1])).as_text().as_deref(), Some(r#"["a",1]"#));
        assert_eq!(PgBindValue::Json(json!("x")).as_text().as_deref(), Some(r#""x""#));
        assert_eq!(PgBindValue::Null.as_text(), None);
    }

    #[test]
    fn declared_type_does_not_vary_with_value() {
        let int = PgBindValue::I64(1);
        let float = PgBindValue::F64(1.5);
        let a = <PgBindValue as Encode<Postgres>>::produces(&int);
        let b = <PgBindValue as Encode<Postgres>>::produces(&float);
        assert_eq!(a, b);
    }
}
