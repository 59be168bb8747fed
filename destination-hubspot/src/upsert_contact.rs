//! Create or update a contact in HubSpot.
//!
//! The single-record path updates by identifier and falls back to a create on
//! 404. The batched path goes through the upsert engine: one batched read,
//! reconciliation into create/update queues, one batched call per queue, and
//! the lifecycle-stage corrective pass.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use destination_common::error::DestinationError;
use destination_common::flatten::flatten_properties;
use destination_common::mapping::{resolve_fields, FieldDefault, FieldDefinition, FieldType};
use destination_common::transaction::TransactionContext;
use upsert_engine::executor::BatchOutcome;
use upsert_engine::mapper::RecordSpec;
use upsert_engine::{run_upsert, UpsertSpec};

use crate::client::{ContactResponse, HubspotClient};

/// Transaction-context key the resulting contact id is stored under, read by
/// the company action processing the same event.
pub const CONTACT_ID_TX_KEY: &str = "contact_id";

/// Resolved payload for one contact.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactPayload {
    /// Identifier value for the contact. The contact's email address by
    /// default, or the value of any other unique contact property (see
    /// `identifier_type`).
    pub email: String,
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// The contact's stage within the marketing/sales process. HubSpot only
    /// moves stages forward on a direct write; moving backwards needs the
    /// corrective pass.
    #[serde(default)]
    pub lifecyclestage: Option<String>,
    /// Any other default or custom contact properties, flattened before
    /// transmission.
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

fn default_identifier_type() -> String {
    "email".to_string()
}

impl ContactPayload {
    /// Resolve the field catalog against an incoming event and deserialize
    /// the result.
    pub fn from_event(
        event: &Value,
        overrides: &serde_json::Map<String, Value>,
    ) -> Result<Self, DestinationError> {
        let resolved = resolve_fields(&fields(), overrides, event)?;
        serde_json::from_value(Value::Object(resolved))
            .map_err(|e| DestinationError::Validation(e.to_string()))
    }

    fn named_properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        let named = [
            ("company", &self.company),
            ("firstname", &self.firstname),
            ("lastname", &self.lastname),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("zip", &self.zip),
            ("website", &self.website),
        ];
        for (name, value) in named {
            if let Some(value) = value {
                properties.insert(name.to_string(), value.clone());
            }
        }
        properties
    }

    fn record_spec(&self) -> RecordSpec {
        RecordSpec {
            identifier: self.email.clone(),
            properties: self.named_properties(),
            extra: self.properties.clone(),
            constrained: match &self.lifecyclestage {
                Some(stage) => BTreeMap::from([(
                    "lifecyclestage".to_string(),
                    stage.to_lowercase(),
                )]),
                None => BTreeMap::new(),
            },
        }
    }
}

fn upsert_spec(max_batch_size: usize) -> UpsertSpec {
    UpsertSpec {
        id_property: "email",
        // hs_additional_emails carries a contact's secondary addresses.
        lookup_properties: vec!["email", "lifecyclestage", "hs_additional_emails"],
        alias_property: Some("hs_additional_emails"),
        max_batch_size,
        tx_key: Some(CONTACT_ID_TX_KEY),
    }
}

/// Upsert a single contact.
pub async fn perform(
    client: &HubspotClient,
    payload: &ContactPayload,
    tx: &mut TransactionContext,
) -> Result<ContactResponse, DestinationError> {
    let mut properties = payload.named_properties();
    for (name, value) in flatten_properties(&payload.properties) {
        properties.insert(name, value);
    }
    if let Some(stage) = &payload.lifecyclestage {
        properties.insert("lifecyclestage".to_string(), stage.to_lowercase());
    }
    properties.insert(payload.identifier_type.clone(), payload.email.clone());

    Ok(client
        .upsert_contact(&payload.email, &payload.identifier_type, properties, tx)
        .await?)
}

/// Upsert a batch of contacts through the reconciliation engine.
pub async fn perform_batch(
    client: &HubspotClient,
    payloads: &[ContactPayload],
    tx: &mut TransactionContext,
) -> Result<BatchOutcome, DestinationError> {
    let specs = payloads.iter().map(ContactPayload::record_spec).collect();
    run_upsert(specs, &upsert_spec(client.max_batch_size()), client, tx).await
}

/// The action's field catalog, with defaults resolved against identify
/// events.
pub fn fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition {
            name: "email",
            label: "Identifier Value",
            field_type: FieldType::String,
            required: true,
            default: Some(FieldDefault::path("$.traits.email")),
        },
        FieldDefinition {
            name: "identifier_type",
            label: "Identifier Type",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::Literal(Value::String("email".to_string()))),
        },
        FieldDefinition {
            name: "company",
            label: "Company Name",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.company")),
        },
        FieldDefinition {
            name: "firstname",
            label: "First Name",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::if_exists(
                "$.traits.first_name",
                "$.traits.first_name",
                "$.traits.firstName",
            )),
        },
        FieldDefinition {
            name: "lastname",
            label: "Last Name",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::if_exists(
                "$.traits.last_name",
                "$.traits.last_name",
                "$.traits.lastName",
            )),
        },
        FieldDefinition {
            name: "phone",
            label: "Phone",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.phone")),
        },
        FieldDefinition {
            name: "address",
            label: "Street Address",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.address.street")),
        },
        FieldDefinition {
            name: "city",
            label: "City",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.address.city")),
        },
        FieldDefinition {
            name: "state",
            label: "State",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.address.state")),
        },
        FieldDefinition {
            name: "country",
            label: "Country",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.address.country")),
        },
        FieldDefinition {
            name: "zip",
            label: "Postal Code",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::if_exists(
                "$.traits.address.postalCode",
                "$.traits.address.postalCode",
                "$.traits.address.postal_code",
            )),
        },
        FieldDefinition {
            name: "website",
            label: "Website",
            field_type: FieldType::String,
            required: false,
            default: Some(FieldDefault::path("$.traits.website")),
        },
        FieldDefinition {
            name: "lifecyclestage",
            label: "Lifecycle Stage",
            field_type: FieldType::String,
            required: false,
            default: None,
        },
        FieldDefinition {
            name: "properties",
            label: "Other properties",
            field_type: FieldType::Object,
            required: false,
            default: None,
        },
    ]
}
