//! # Connection Settings
//!
//! Environment-based settings for the shared Redis connection.

use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Environment variable holding the Redis connection URL.
pub const REDIS_URL_VAR: &str = "REDIS_URL";

/// Settings for the shared Redis connection.
///
/// The URL is kept optional on purpose: a missing or blank value is reported
/// as a configuration error at first use, not at load time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`
    pub url: Option<String>,

    /// Timeout for establishing the underlying connection
    pub connect_timeout: Option<Duration>,

    /// Timeout for individual command responses
    pub response_timeout: Option<Duration>,
}

impl ConnectionSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Settings with an explicit URL, for composition roots that do not read
    /// the environment.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: lookup(REDIS_URL_VAR),
            connect_timeout: lookup("REDIS_CONNECT_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            response_timeout: lookup("REDIS_RESPONSE_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
        }
    }

    /// Connection URL, rejecting missing or blank values.
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ClientError::Configuration(format!(
                    "{REDIS_URL_VAR} must be set to a non-empty connection URL"
                ))
            })
    }
}
