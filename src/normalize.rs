// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Coercion of loosely-typed model output into the item schema
//!
//! Vision models answer in whatever shape they like: a single string where a
//! list was asked for, `"Yes"` instead of `true`, and so on. [`normalize`]
//! fixes the value types of the known fields without adding or removing any.

use serde_json::{Map, Value};

/// A JSON object holding item fields
pub type Fields = Map<String, Value>;

/// Fields that must always be a list of strings
const LIST_FIELDS: [&str; 2] = ["components", "harmful_substances"];

/// Normalize value types of the item fields present in `fields`
pub fn normalize(mut fields: Fields) -> Fields {
    for key in LIST_FIELDS {
        if let Some(value) = fields.get_mut(key) {
            coerce_list(value);
        }
    }

    if let Some(value) = fields.get_mut("recyclable") {
        *value = Value::Bool(coerce_recyclable(value));
    }

    fields
}

/// Interpret a `recyclable` value as a boolean
///
/// Strings are matched case-insensitively against `true`, `yes` and `1`;
/// anything that is neither a string nor a boolean is `false`.
pub fn coerce_recyclable(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn coerce_list(value: &mut Value) {
    match value {
        Value::Array(_) => {}
        Value::String(s) => *value = Value::Array(vec![Value::String(std::mem::take(s))]),
        _ => *value = Value::Array(Vec::new()),
    }
}
