//! Flattening of free-form event properties into the scalar-only shape most
//! CRM APIs accept.

use std::collections::BTreeMap;

use serde_json::Value;

/// Flatten a map of arbitrary JSON values to scalar strings.
///
/// Deterministic by construction: scalars keep their string form, arrays are
/// stringified element-wise and joined with `;`, objects are serialised to
/// compact JSON. Nulls are dropped.
pub fn flatten_properties(properties: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for (name, value) in properties {
        if let Some(scalar) = flatten_value(value) {
            flat.insert(name.clone(), scalar);
        }
    }
    flat
}

pub fn flatten_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(flatten_value)
                .collect::<Vec<_>>()
                .join(";"),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}
