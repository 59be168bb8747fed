//! The batch mapper: turns resolved payloads into the identifier-keyed map of
//! pending upsert operations the reconciler works on.

use std::collections::BTreeMap;

use serde_json::Value;

use destination_common::error::DestinationError;
use destination_common::flatten::flatten_properties;

use crate::identifier::IdentifierKey;
use crate::record::{UpsertAction, UpsertBatch, UpsertRecord};

/// One record's input to the mapper, as resolved by the destination's mapping
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct RecordSpec {
    /// Raw identifier value; normalized here.
    pub identifier: String,
    /// Named destination fields, already scalar.
    pub properties: BTreeMap<String, String>,
    /// Free-form custom properties; flattened here.
    pub extra: serde_json::Map<String, Value>,
    /// Fields under non-monotonic-write protection, with desired values.
    /// Copied into `properties` as well so the primary write carries them.
    pub constrained: BTreeMap<String, String>,
}

/// Build the pending-record map for a batch.
///
/// Pure over its inputs apart from identifier normalisation; every record
/// starts `Undetermined` with no remote id. A missing identifier fails the
/// whole batch before any network call.
pub fn map_batch(
    specs: Vec<RecordSpec>,
    id_property: &str,
) -> Result<UpsertBatch, DestinationError> {
    let mut batch = UpsertBatch::new();
    for spec in specs {
        if spec.identifier.is_empty() {
            return Err(DestinationError::Validation(format!(
                "record is missing its '{id_property}' identifier"
            )));
        }
        let key = IdentifierKey::normalize(&spec.identifier);

        let mut properties = spec.properties;
        for (name, value) in flatten_properties(&spec.extra) {
            properties.insert(name, value);
        }
        for (field, desired) in &spec.constrained {
            properties.insert(field.clone(), desired.clone());
        }
        properties.insert(id_property.to_string(), key.as_str().to_string());

        batch.insert(UpsertRecord {
            key,
            properties,
            constrained: spec.constrained,
            action: UpsertAction::Undetermined,
        });
    }
    Ok(batch)
}
