//! Error types for tickloop-probe

use thiserror::Error;

/// Errors that can occur while probing an external collaborator
#[derive(Error, Debug)]
pub enum ProbeError {
    /// No API key was supplied for the collaborator
    #[error("missing API key: {0}")]
    MissingApiKey(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The collaborator answered with a non-success status
    #[error("unexpected status {status} from {service}")]
    UnexpectedStatus { service: String, status: u16 },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        ProbeError::Http(err.to_string())
    }
}
