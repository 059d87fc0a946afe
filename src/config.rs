//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default bound on a single remote call.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Remote booking API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com/v1`. No trailing slash needed.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub auth_token: Option<SecretString>,
    /// Transport-level timeout applied by the HTTP client.
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Build config from environment variables.
    ///
    /// `BOOKING_API_URL` is required; `BOOKING_API_TOKEN` and
    /// `BOOKING_REQUEST_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("BOOKING_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("BOOKING_API_URL".to_string()))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BOOKING_API_URL".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let mut config = Self::new(base_url.trim());
        config.auth_token = std::env::var("BOOKING_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        config.request_timeout = request_timeout_from_env()?;
        Ok(config)
    }
}

/// Per-session behavior of the booking flow.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bounded wait for any remote read or write. On expiry the call is
    /// classified as a timeout and the loading flag is cleared.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            request_timeout: request_timeout_from_env()?,
        })
    }
}

fn request_timeout_from_env() -> Result<Duration, ConfigError> {
    match std::env::var("BOOKING_REQUEST_TIMEOUT_SECS") {
        Ok(raw) => parse_timeout_secs(&raw),
        Err(_) => Ok(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
    }
}

fn parse_timeout_secs(raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: "BOOKING_REQUEST_TIMEOUT_SECS".to_string(),
        message: format!("expected a whole number of seconds, got {raw:?}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "BOOKING_REQUEST_TIMEOUT_SECS".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
