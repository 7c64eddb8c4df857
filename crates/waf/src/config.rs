//! Middleware configuration.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::buffer_pool::{COPY_BUFFER_SIZE, MAX_POOLED_BUFFER_SIZE};
use crate::errors::ConfigError;
use crate::resolve::StatusPolicy;

/// Configuration for the WAF middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WafConfig {
    /// Size of the pooled buffers used for bulk body copies
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Interceptor states kept for reuse between requests
    #[serde(default = "default_max_idle_interceptors")]
    pub max_idle_interceptors: usize,

    /// Status for a blocking verdict without explicit status
    #[serde(default = "default_deny_status")]
    pub default_deny_status: u16,

    /// Status sent when the request phases fail locally (body read errors)
    #[serde(default = "default_request_failure_status")]
    pub request_failure_status: u16,
}

fn default_copy_buffer_size() -> usize { COPY_BUFFER_SIZE }
fn default_max_idle_interceptors() -> usize { 256 }
fn default_deny_status() -> u16 { 403 }
fn default_request_failure_status() -> u16 { 500 }

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            copy_buffer_size: default_copy_buffer_size(),
            max_idle_interceptors: default_max_idle_interceptors(),
            default_deny_status: default_deny_status(),
            request_failure_status: default_request_failure_status(),
        }
    }
}

impl WafConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.copy_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "copy_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.copy_buffer_size > MAX_POOLED_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "copy_buffer_size {} exceeds the poolable maximum of {} bytes",
                self.copy_buffer_size, MAX_POOLED_BUFFER_SIZE
            )));
        }
        for (field, code) in [
            ("default_deny_status", self.default_deny_status),
            ("request_failure_status", self.request_failure_status),
        ] {
            match StatusCode::from_u16(code) {
                Ok(status) if status.is_client_error() || status.is_server_error() => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "{field} must be a 4xx or 5xx status, got {code}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Verdict resolution policy derived from this configuration.
    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::new(
            StatusCode::from_u16(self.default_deny_status).unwrap_or(StatusCode::FORBIDDEN),
        )
    }

    /// Status for request-phase local failures.
    pub fn request_failure_status(&self) -> StatusCode {
        StatusCode::from_u16(self.request_failure_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
