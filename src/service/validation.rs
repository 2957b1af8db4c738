//! Request validation from the per-entity rules in the content model.

use crate::config::FieldRule;
use crate::error::AppError;
use crate::slug::is_valid_slug;
use serde_json::Value;
use std::collections::HashMap;

/// `local@domain.tld` with no whitespace. Shared with contact intake.
pub fn is_valid_email(s: &str) -> bool {
    if s.len() > 254 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body: required fields must be present and non-null.
    pub fn validate(body: &HashMap<String, Value>, rules: &HashMap<String, FieldRule>) -> Result<(), AppError> {
        let mut cols: Vec<&String> = rules.keys().collect();
        cols.sort();
        for col in cols {
            let rule = &rules[col];
            let val = body.get(col);
            if rule.rule.required == Some(true) && is_blank(val) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present (PATCH). A required field may not be cleared.
    pub fn validate_partial(body: &HashMap<String, Value>, rules: &HashMap<String, FieldRule>) -> Result<(), AppError> {
        let mut cols: Vec<&String> = body.keys().collect();
        cols.sort();
        for col in cols {
            let Some(rule) = rules.get(col) else { continue };
            let v = &body[col];
            if rule.rule.required == Some(true) && is_blank(Some(v)) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            validate_field(col, v, rule)?;
        }
        Ok(())
    }
}

fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn validate_field(col: &str, v: &Value, field: &FieldRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    let rule = &field.rule;
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!("{} must be at least {} characters", col, min)));
            }
        }
        if let Some(re) = &field.pattern {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let shown: Vec<String> = allowed.iter().take(5).map(|a| a.to_string()).collect();
            return Err(AppError::Validation(format!("{} must be one of: {}", col, shown.join(", "))));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    if let Some(keys) = &rule.item_keys {
        let items = v
            .as_array()
            .ok_or_else(|| AppError::Validation(format!("{} must be an array", col)))?;
        for (i, item) in items.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| AppError::Validation(format!("{}[{}] must be an object", col, i)))?;
            if let Some(missing) = keys.iter().find(|k| !obj.contains_key(k.as_str())) {
                return Err(AppError::Validation(format!("{}[{}] is missing '{}'", col, i, missing)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Err(AppError::Validation(format!("{} must be a string", col)));
    };
    let ok = match format.to_ascii_lowercase().as_str() {
        "email" => is_valid_email(s),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "slug" => is_valid_slug(s),
        "url" => s.starts_with("https://") || s.starts_with("http://") || s.starts_with('/'),
        "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be a valid {}", col, format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationRule;
    use serde_json::json;

    fn rules(pairs: &[(&str, ValidationRule)]) -> HashMap<String, FieldRule> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldRule::compile("test", k, v).unwrap()))
            .collect()
    }

    fn body(v: Value) -> HashMap<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn required_field_missing_or_blank_fails() {
        let r = rules(&[("question", ValidationRule { required: Some(true), ..Default::default() })]);
        assert!(RequestValidator::validate(&body(json!({})), &r).is_err());
        assert!(RequestValidator::validate(&body(json!({"question": "  "})), &r).is_err());
        assert!(RequestValidator::validate(&body(json!({"question": "How long?"})), &r).is_ok());
    }

    #[test]
    fn partial_skips_missing_but_rejects_clearing() {
        let r = rules(&[("question", ValidationRule { required: Some(true), ..Default::default() })]);
        assert!(RequestValidator::validate_partial(&body(json!({"answer": "x"})), &r).is_ok());
        assert!(RequestValidator::validate_partial(&body(json!({"question": null})), &r).is_err());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let r = rules(&[("title", ValidationRule { max_length: Some(4), ..Default::default() })]);
        assert!(RequestValidator::validate(&body(json!({"title": "café"})), &r).is_ok());
        assert!(RequestValidator::validate(&body(json!({"title": "cafés"})), &r).is_err());
    }

    #[test]
    fn rating_range_is_enforced() {
        let r = rules(&[("rating", ValidationRule { minimum: Some(1.0), maximum: Some(5.0), ..Default::default() })]);
        assert!(RequestValidator::validate(&body(json!({"rating": 5})), &r).is_ok());
        assert!(RequestValidator::validate(&body(json!({"rating": 0})), &r).is_err());
        assert!(RequestValidator::validate(&body(json!({"rating": 6})), &r).is_err());
    }

    #[test]
    fn item_keys_checks_every_element() {
        let r = rules(&[(
            "values",
            ValidationRule { item_keys: Some(vec!["title".into(), "description".into()]), ..Default::default() },
        )]);
        let good = json!({"values": [{"icon": "x", "title": "Fast", "description": "Quick setup"}]});
        assert!(RequestValidator::validate(&body(good), &r).is_ok());
        let bad = json!({"values": [{"title": "Fast"}]});
        let err = RequestValidator::validate(&body(bad), &r).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn formats() {
        let r = rules(&[
            ("email", ValidationRule { format: Some("email".into()), ..Default::default() }),
            ("slug", ValidationRule { format: Some("slug".into()), ..Default::default() }),
        ]);
        assert!(RequestValidator::validate(&body(json!({"email": "a@b.co", "slug": "office-trailers"})), &r).is_ok());
        assert!(RequestValidator::validate(&body(json!({"email": "a@b"})), &r).is_err());
        assert!(RequestValidator::validate(&body(json!({"slug": "Office Trailers"})), &r).is_err());
    }

    #[test]
    fn allowed_values() {
        let r = rules(&[("status", ValidationRule { allowed: Some(vec![json!("draft"), json!("published")]), ..Default::default() })]);
        assert!(RequestValidator::validate(&body(json!({"status": "draft"})), &r).is_ok());
        assert!(RequestValidator::validate(&body(json!({"status": "deleted"})), &r).is_err());
    }

    #[test]
    fn compiled_pattern_is_applied() {
        let r = rules(&[("state", ValidationRule { pattern: Some("^[A-Z]{2}$".into()), ..Default::default() })]);
        assert!(r["state"].pattern.is_some());
        assert!(RequestValidator::validate(&body(json!({"state": "OK"})), &r).is_ok());
        let err = RequestValidator::validate(&body(json!({"state": "Oklahoma"})), &r).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
