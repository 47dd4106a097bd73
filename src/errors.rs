//! Error taxonomy for the Fetchly engine.
//!
//! Variants are split along what a caller can do about the failure: bad input
//! is rejected before any network traffic, transport trouble is worth the
//! configured retry budget, and a structurally broken service reply fails
//! fast so the budget is not wasted on it.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Malformed or missing input (empty URL, bad trim range). Never retried.
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// A submit arrived while another operation was in flight.
    #[error("session is busy; {operation} rejected")]
    Busy { operation: &'static str },

    /// Transport-level failure (connect, timeout, body read).
    #[error("request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    /// A 2xx reply that is structurally incomplete (missing `download_url`
    /// or `filename`, unparseable body). Retrying would see the same reply.
    #[error("service returned an incomplete response: {reason}")]
    InvalidResponse { reason: String },

    /// The call succeeded transport-wise but carried no usable payload.
    #[error("no usable result for {resource}")]
    NotFound { resource: String },

    /// The orchestration was aborted by explicit cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Local filesystem failure while saving an artifact.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Contract violations and invalid input fail the same way every time;
    /// 5xx and transport failures are transient until proven otherwise.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. }
            | Self::Busy { .. }
            | Self::InvalidResponse { .. }
            | Self::NotFound { .. }
            | Self::Cancelled => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. } | Self::Io { .. } => true,
        }
    }
}
