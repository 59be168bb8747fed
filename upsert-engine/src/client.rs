//! The boundary to a remote system's batched object API.
//!
//! The wire shapes mirror the batch contract shared by CRM-style APIs: one
//! read-by-identifier call, one create call and one update call, each carrying
//! up to the remote's per-call record limit, with per-record results and
//! per-record error entries in the response body.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use destination_common::error::DestinationError;

/// Error category remotes use for identifiers that do not exist. This is the
/// one category that is normal control flow: it routes records to the create
/// queue instead of failing the batch.
pub const NOT_FOUND_CATEGORY: &str = "OBJECT_NOT_FOUND";

#[derive(Debug, Clone, Serialize)]
pub struct BatchReadRequest {
    #[serde(rename = "idProperty")]
    pub id_property: String,
    /// Remote fields to echo back; must include the id property, any alias
    /// property and every constrained field.
    pub properties: Vec<String>,
    pub inputs: Vec<ReadInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadInput {
    pub id: String,
}

/// One record of a batched create or update call. `id` is present only for
/// updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Properties echoed by the remote. Values can be explicit nulls for fields
/// the entity does not carry.
pub type EchoedProperties = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    pub id: String,
    #[serde(default)]
    pub properties: EchoedProperties,
}

impl BatchResult {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|value| value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorContext {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchErrorEntry {
    #[serde(default)]
    pub status: String,
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
}

impl BatchErrorEntry {
    pub fn is_not_found(&self) -> bool {
        self.category == NOT_FOUND_CATEGORY
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Vec<BatchResult>,
    #[serde(default, rename = "numErrors")]
    pub num_errors: u32,
    #[serde(default)]
    pub errors: Vec<BatchErrorEntry>,
}

/// A destination's batched object API.
///
/// Implementations own authentication, endpoints and transport. Retry and
/// backoff live beneath this trait; the engine treats every error it returns
/// as terminal for the affected call.
#[async_trait]
pub trait RemoteBatchClient: Send + Sync {
    async fn batch_read(&self, request: BatchReadRequest) -> Result<BatchResponse, DestinationError>;

    async fn batch_create(&self, inputs: Vec<WriteInput>) -> Result<BatchResponse, DestinationError>;

    async fn batch_update(&self, inputs: Vec<WriteInput>) -> Result<BatchResponse, DestinationError>;
}
