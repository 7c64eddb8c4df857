//! Error types for the interception core.
//!
//! Blocking verdicts are not errors and never appear here. These types cover
//! local I/O failures of the phase drivers, missing writer capabilities and
//! bad configuration.

use rampart_inspect::InspectError;
use thiserror::Error;

/// Local failures of the request and response phase drivers.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// Buffering the request body into the session failed
    #[error("failed to append request body: {0}")]
    RequestBody(#[source] InspectError),

    /// The session could not hand back the buffered request body
    #[error("failed to get the request body: {0}")]
    RequestBodyReader(#[source] InspectError),

    /// The request body phase failed
    #[error("failed to process request body: {0}")]
    RequestBodyPhase(#[source] InspectError),

    /// The response body phase failed
    #[error("failed to process response body: {0}")]
    ResponseBodyPhase(#[source] InspectError),

    /// The session could not hand back the buffered response body
    #[error("failed to release the response body reader: {0}")]
    ResponseBodyReader(#[source] InspectError),

    /// Streaming the released response body to the client failed
    #[error("failed to copy the response body: {0}")]
    CopyResponse(#[source] std::io::Error),
}

/// Failures of optional response writer capabilities.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The underlying writer does not support the capability
    #[error("feature not supported")]
    NotSupported,

    /// The capability is supported but failed
    #[error("writer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WriterError {
    /// Whether this is the "not supported" signal.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, WriterError::NotSupported)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML syntax or shape error
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or shape error
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Values parsed but are not usable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
