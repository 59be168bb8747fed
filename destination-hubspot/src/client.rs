//! HTTP client for HubSpot's CRM v3 contact endpoints.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use destination_common::error::DestinationError;
use destination_common::transaction::TransactionContext;
use upsert_engine::client::{
    BatchReadRequest, BatchResponse, EchoedProperties, RemoteBatchClient, WriteInput,
};

use crate::config::HubspotConfig;
use crate::upsert_contact::CONTACT_ID_TX_KEY;

/// Per-invocation destination settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HubspotSettings {
    /// Private app access token.
    pub access_token: String,
}

#[derive(Error, Debug)]
pub enum HubspotError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("{category}: {message}")]
    Api {
        status: StatusCode,
        category: String,
        message: String,
    },
}

impl HubspotError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubspotError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

impl From<HubspotError> for DestinationError {
    fn from(error: HubspotError) -> Self {
        match error {
            HubspotError::Request(e) => DestinationError::Request(e.to_string()),
            HubspotError::Api {
                status,
                category,
                message,
            } => DestinationError::FatalRemote {
                category,
                message,
                status: Some(status.as_u16()),
            },
        }
    }
}

/// Error body HubSpot returns on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct HubspotErrorBody {
    #[serde(default)]
    category: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactResponse {
    pub id: String,
    #[serde(default)]
    pub properties: EchoedProperties,
}

impl ContactResponse {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|value| value.as_deref())
    }
}

pub struct HubspotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    max_batch_size: usize,
}

impl HubspotClient {
    pub fn new(config: &HubspotConfig, settings: HubspotSettings) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("destination-hubspot")
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("failed to construct reqwest client for hubspot");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: settings.access_token,
            max_batch_size: config.max_batch_size,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn contacts_url(&self, suffix: &str) -> String {
        format!("{}/crm/v3/objects/contacts{}", self.base_url, suffix)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: String,
        body: &B,
    ) -> Result<T, HubspotError> {
        let response = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let body = response
                .json::<HubspotErrorBody>()
                .await
                .unwrap_or_default();
            Err(HubspotError::Api {
                status,
                category: body.category,
                message: body.message,
            })
        }
    }

    pub async fn create_contact(
        &self,
        properties: &BTreeMap<String, String>,
    ) -> Result<ContactResponse, HubspotError> {
        self.send(
            reqwest::Method::POST,
            self.contacts_url(""),
            &json!({ "properties": properties }),
        )
        .await
    }

    pub async fn update_contact(
        &self,
        identifier: &str,
        id_property: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<ContactResponse, HubspotError> {
        self.send(
            reqwest::Method::PATCH,
            self.contacts_url(&format!("/{identifier}?idProperty={id_property}")),
            &json!({ "properties": properties }),
        )
        .await
    }

    /// Single-contact upsert: try an update by identifier and fall back to a
    /// create when HubSpot reports the contact as not found (404). The remote
    /// id is cached in the transaction context for follow-up actions.
    ///
    /// HubSpot echoes the stored lifecycle stage in the update response. When
    /// the write tried to move the stage backwards the echo keeps the old
    /// stage; clearing the field and re-applying the desired value gets the
    /// write through.
    pub async fn upsert_contact(
        &self,
        identifier: &str,
        id_property: &str,
        properties: BTreeMap<String, String>,
        tx: &mut TransactionContext,
    ) -> Result<ContactResponse, HubspotError> {
        match self.update_contact(identifier, id_property, &properties).await {
            Ok(response) => {
                tx.set(CONTACT_ID_TX_KEY, &response.id);

                if let Some(desired) = properties.get("lifecyclestage") {
                    if response.property("lifecyclestage") != Some(desired.as_str()) {
                        debug!(
                            contact = %response.id,
                            desired,
                            "lifecycle stage was retained by hubspot; resetting and re-applying"
                        );
                        let mut reset = properties.clone();
                        reset.insert("lifecyclestage".to_string(), String::new());
                        self.update_contact(identifier, id_property, &reset).await?;
                        return self.update_contact(identifier, id_property, &properties).await;
                    }
                }
                Ok(response)
            }
            Err(error) if error.is_not_found() => {
                let response = self.create_contact(&properties).await?;
                tx.set(CONTACT_ID_TX_KEY, &response.id);
                Ok(response)
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl RemoteBatchClient for HubspotClient {
    async fn batch_read(
        &self,
        request: BatchReadRequest,
    ) -> Result<BatchResponse, DestinationError> {
        Ok(self
            .send(reqwest::Method::POST, self.contacts_url("/batch/read"), &request)
            .await?)
    }

    async fn batch_create(
        &self,
        inputs: Vec<WriteInput>,
    ) -> Result<BatchResponse, DestinationError> {
        Ok(self
            .send(
                reqwest::Method::POST,
                self.contacts_url("/batch/create"),
                &json!({ "inputs": inputs }),
            )
            .await?)
    }

    async fn batch_update(
        &self,
        inputs: Vec<WriteInput>,
    ) -> Result<BatchResponse, DestinationError> {
        Ok(self
            .send(
                reqwest::Method::POST,
                self.contacts_url("/batch/update"),
                &json!({ "inputs": inputs }),
            )
            .await?)
    }
}
