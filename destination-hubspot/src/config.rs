use envconfig::Envconfig;

/// Service-level tuning for the HubSpot client. Credentials are not part of
/// this: the private app token arrives per-invocation in the destination
/// settings.
#[derive(Envconfig, Debug, Clone)]
pub struct HubspotConfig {
    #[envconfig(from = "HUBSPOT_BASE_URL", default = "https://api.hubapi.com")]
    pub base_url: String,

    #[envconfig(from = "HUBSPOT_REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout_ms: u64,

    /// HubSpot's batch endpoints accept at most 100 records per call.
    #[envconfig(from = "HUBSPOT_MAX_BATCH_SIZE", default = "100")]
    pub max_batch_size: usize,
}

impl HubspotConfig {
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_ms: 10_000,
            max_batch_size: 100,
        }
    }
}
