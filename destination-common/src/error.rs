use thiserror::Error;

/// Errors a destination action surfaces to the invoking framework.
///
/// The expected "identifier not found" lookup outcome is deliberately absent:
/// it is normal control flow inside the upsert engine and is modelled as a
/// result variant there, never as an error the caller sees.
#[derive(Error, Debug)]
pub enum DestinationError {
    /// The mapped payload is unusable (e.g. missing a required identifier).
    /// Raised before any network call is made and never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote API reported an error category other than not-found. The
    /// category and message are passed through verbatim.
    #[error("{category}: {message}")]
    FatalRemote {
        category: String,
        message: String,
        status: Option<u16>,
    },

    /// The request never produced a usable response (connect failure, timeout,
    /// unparseable body). Retry policy for these lives in the HTTP layer, not
    /// here.
    #[error("request error: {0}")]
    Request(String),

    /// A contract violation inside the pipeline, such as a record left
    /// unclassified after every lookup result was processed.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl DestinationError {
    pub fn fatal_remote(category: impl Into<String>, message: impl Into<String>) -> Self {
        DestinationError::FatalRemote {
            category: category.into(),
            message: message.into(),
            status: None,
        }
    }
}
