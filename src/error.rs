//! Error types for the Riak cache client

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the store
#[derive(Error, Debug)]
pub enum Error {
    /// The request did not complete within the configured timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Network or connection failure below the HTTP layer
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected the request as malformed (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The store is temporarily unable to serve the request (HTTP 503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A conditional write did not match the stored object (HTTP 412)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A concurrent write conflicted with this one (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A registered codec failed to encode or decode a value
    #[error("Codec error for '{content_type}': {message}")]
    Codec {
        /// Normalized content type the codec was registered under
        content_type: String,
        /// Error message from the codec
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status this error was promoted from, if any.
    #[inline]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::BadRequest(_) => Some(StatusCode::BAD_REQUEST),
            Error::ServiceUnavailable(_) => Some(StatusCode::SERVICE_UNAVAILABLE),
            Error::PreconditionFailed(_) => Some(StatusCode::PRECONDITION_FAILED),
            Error::Conflict(_) => Some(StatusCode::CONFLICT),
            _ => None,
        }
    }

    /// True for failures raised by the transport rather than the store.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Connection(_))
    }

    pub(crate) fn codec(content_type: &str, message: impl Into<String>) -> Self {
        Error::Codec {
            content_type: content_type.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
