//! Error types for the mail.tm client.

use thiserror::Error;

/// Errors that can occur during mail.tm operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider rejected a request with an error status.
    ///
    /// `message` carries the provider's human-readable description
    /// (`hydra:description` or `message` from the error payload) or a
    /// generic fallback when the payload has neither.
    #[error("{message}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Provider-supplied description of the failure.
        message: String,
    },
}
