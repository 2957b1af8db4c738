//! Request key normalization: admin clients may post camelCase keys, columns are snake_case.

use serde_json::Value;
use std::collections::HashMap;

/// "displayOrder" -> "display_order". Already-snake input is returned unchanged.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Turns a JSON object body into a column map with snake_case keys.
/// When both spellings are present the snake_case one wins.
pub fn object_to_column_map(obj: serde_json::Map<String, Value>) -> HashMap<String, Value> {
    let mut out = HashMap::with_capacity(obj.len());
    let mut camel = Vec::new();
    for (k, v) in obj {
        let snake = to_snake_case(&k);
        if snake == k {
            out.insert(k, v);
        } else {
            camel.push((snake, v));
        }
    }
    for (k, v) in camel {
        out.entry(k).or_insert(v);
    }
    out
}
