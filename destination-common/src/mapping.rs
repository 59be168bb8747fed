//! Mapping-configuration resolution.
//!
//! Each destination action declares a typed field catalog. A field's value for
//! a given event comes from the user's mapping override when present, else
//! from the field's default directive: a dot-path into the event JSON, a
//! conditional path, or a literal. The output is the resolved payload object
//! the upsert engine consumes.

use serde_json::Value;

use crate::error::DestinationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Datetime,
}

/// Default directive for a field, evaluated against the incoming event.
#[derive(Debug, Clone)]
pub enum FieldDefault {
    /// A dot-path into the event, e.g. `$.traits.email`.
    Path(String),
    /// Conditional path: if `exists` resolves to a value, use `then`,
    /// otherwise `fallback`.
    If {
        exists: String,
        then: Box<FieldDefault>,
        fallback: Box<FieldDefault>,
    },
    Literal(Value),
}

impl FieldDefault {
    pub fn path(path: &str) -> Self {
        FieldDefault::Path(path.to_string())
    }

    pub fn if_exists(exists: &str, then: &str, fallback: &str) -> Self {
        FieldDefault::If {
            exists: exists.to_string(),
            then: Box::new(FieldDefault::path(then)),
            fallback: Box::new(FieldDefault::path(fallback)),
        }
    }

    /// Parse a mapping override into a directive. Objects shaped like
    /// `{"@path": "..."}` or `{"@if": {...}}` are directives; anything else is
    /// a literal value.
    pub fn from_value(value: &Value) -> FieldDefault {
        if let Value::Object(map) = value {
            if let Some(Value::String(path)) = map.get("@path") {
                return FieldDefault::Path(path.clone());
            }
            if let Some(Value::Object(cond)) = map.get("@if") {
                let exists = cond
                    .get("exists")
                    .map(FieldDefault::from_value)
                    .and_then(|d| match d {
                        FieldDefault::Path(p) => Some(p),
                        _ => None,
                    });
                let then = cond.get("then").map(FieldDefault::from_value);
                let fallback = cond.get("else").map(FieldDefault::from_value);
                if let (Some(exists), Some(then), Some(fallback)) = (exists, then, fallback) {
                    return FieldDefault::If {
                        exists,
                        then: Box::new(then),
                        fallback: Box::new(fallback),
                    };
                }
            }
        }
        FieldDefault::Literal(value.clone())
    }

    fn resolve(&self, event: &Value) -> Option<Value> {
        match self {
            FieldDefault::Path(path) => lookup_path(event, path).cloned(),
            FieldDefault::If {
                exists,
                then,
                fallback,
            } => {
                if lookup_path(event, exists).is_some() {
                    then.resolve(event)
                } else {
                    fallback.resolve(event)
                }
            }
            FieldDefault::Literal(value) => Some(value.clone()),
        }
    }
}

/// One entry in an action's field catalog.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub label: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

/// Follow a `$.a.b.c` dot-path into an event. Returns `None` for missing
/// segments and for explicit nulls.
pub fn lookup_path<'a>(event: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.strip_prefix("$.")?;
    let mut current = event;
    for segment in trimmed.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Resolve a field catalog against an event, applying mapping overrides first
/// and default directives second.
pub fn resolve_fields(
    fields: &[FieldDefinition],
    overrides: &serde_json::Map<String, Value>,
    event: &Value,
) -> Result<serde_json::Map<String, Value>, DestinationError> {
    let mut payload = serde_json::Map::new();
    for field in fields {
        let resolved = match overrides.get(field.name) {
            Some(value) if field.field_type == FieldType::Object => {
                resolve_object(value, event)
            }
            Some(value) => FieldDefault::from_value(value).resolve(event),
            None => field
                .default
                .as_ref()
                .and_then(|default| default.resolve(event)),
        };
        match resolved {
            Some(value) => {
                payload.insert(field.name.to_string(), value);
            }
            None if field.required => {
                return Err(DestinationError::Validation(format!(
                    "missing required field '{}'",
                    field.name
                )));
            }
            None => {}
        }
    }
    Ok(payload)
}

/// Object-typed fields resolve each entry as its own directive, so a custom
/// property map can mix literals and paths. Entries resolving to nothing are
/// dropped.
fn resolve_object(value: &Value, event: &Value) -> Option<Value> {
    let Value::Object(entries) = value else {
        return Some(value.clone());
    };
    let mut resolved = serde_json::Map::new();
    for (name, entry) in entries {
        if let Some(entry) = FieldDefault::from_value(entry).resolve(event) {
            resolved.insert(name.clone(), entry);
        }
    }
    Some(Value::Object(resolved))
}
