//! Queue configuration and environment parsing.
//!
//! [`Config`] is the declared configuration shared by every queue and by the
//! webhook router. [`Settings`] wraps it with the extra knobs the server
//! binary reads from environment variables.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Default path the webhook endpoint is mounted on.
pub const DEFAULT_HANDLER_PATH: &str = "/cloud-tasks";

/// Default Cloud Tasks REST endpoint.
pub const DEFAULT_TASKS_API_URL: &str = "https://cloudtasks.googleapis.com/v2";

/// Default Google token-info endpoint used to verify OIDC identity tokens.
pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Errors raised while validating or resolving a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0} on config")]
    MissingField(&'static str),

    #[error("Invalid handler URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Dispatch rate limits declared for a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dispatches_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_burst_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_dispatches: Option<i32>,
}

/// Retry policy declared for a queue. Durations are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_backoff: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_doublings: Option<i32>,
}

/// Declared configuration for queues and the webhook endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Path of the webhook endpoint, resolved against `service_url`
    pub handler_path: String,

    /// Cloud Tasks location (region), e.g. `us-central1`
    pub location: String,

    /// GCP project id
    pub project: String,

    /// Service account name (without domain) used to sign OIDC tokens.
    /// When set, inbound deliveries must carry a valid bearer token.
    pub service_account: Option<String>,

    /// Public base URL of this service
    pub service_url: String,

    pub rate_limits: Option<RateLimits>,

    pub retry_config: Option<RetryConfig>,
}

/// Per-queue overrides applied on top of a base [`Config`].
///
/// Overrides are shallow: a present block replaces the base block whole,
/// nested fields are never merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueOptions {
    pub rate_limits: Option<RateLimits>,
    pub retry_config: Option<RetryConfig>,
}

impl Config {
    /// Check that every required field is present.
    ///
    /// Fields are checked in a fixed order and the first missing one is
    /// reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("handlerPath", &self.handler_path),
            ("location", &self.location),
            ("project", &self.project),
            ("serviceUrl", &self.service_url),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name));
            }
        }

        Ok(())
    }

    /// Absolute URL of the webhook endpoint (`handler_path` joined onto
    /// `service_url`). Also the audience expected in OIDC tokens.
    pub fn handler_url(&self) -> Result<Url, ConfigError> {
        let invalid = |source: url::ParseError| ConfigError::InvalidUrl {
            url: format!("{}{}", self.service_url, self.handler_path),
            source,
        };

        Url::parse(&self.service_url)
            .and_then(|base| base.join(&self.handler_path))
            .map_err(invalid)
    }

    /// Email of the configured service account, if any.
    pub fn service_account_email(&self) -> Option<String> {
        self.service_account
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|account| format!("{}@{}.iam.gserviceaccount.com", account, self.project))
    }

    /// Apply per-queue overrides, returning a new config.
    pub fn with_overrides(&self, overrides: &QueueOptions) -> Config {
        let mut merged = self.clone();
        if let Some(rate_limits) = &overrides.rate_limits {
            merged.rate_limits = Some(rate_limits.clone());
        }
        if let Some(retry_config) = &overrides.retry_config {
            merged.retry_config = Some(retry_config.clone());
        }
        merged
    }
}

/// Server settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tasks: Config,

    /// Port for the web server to listen on
    pub port: u16,

    /// Base URL of the Cloud Tasks REST API
    pub tasks_api_url: String,

    /// Static OAuth access token for the Cloud Tasks API. When unset the
    /// GCE metadata server is used.
    pub access_token: Option<String>,

    /// Token-info endpoint used to verify inbound OIDC tokens
    pub tokeninfo_url: String,

    /// Queue names declared at startup
    pub queues: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        let rate_limits = RateLimits {
            max_dispatches_per_second: parse_env("CLOUD_TASKS_MAX_DISPATCHES_PER_SECOND"),
            max_burst_size: parse_env("CLOUD_TASKS_MAX_BURST_SIZE"),
            max_concurrent_dispatches: parse_env("CLOUD_TASKS_MAX_CONCURRENT_DISPATCHES"),
        };

        let retry_config = RetryConfig {
            max_attempts: parse_env("CLOUD_TASKS_MAX_ATTEMPTS"),
            max_retry_duration: parse_env("CLOUD_TASKS_MAX_RETRY_DURATION_MS"),
            min_backoff: parse_env("CLOUD_TASKS_MIN_BACKOFF_MS"),
            max_backoff: parse_env("CLOUD_TASKS_MAX_BACKOFF_MS"),
            max_doublings: parse_env("CLOUD_TASKS_MAX_DOUBLINGS"),
        };

        Settings {
            tasks: Config {
                handler_path: env::var("CLOUD_TASKS_HANDLER_PATH")
                    .unwrap_or_else(|_| DEFAULT_HANDLER_PATH.to_string()),
                location: env::var("CLOUD_TASKS_LOCATION").unwrap_or_default(),
                project: env::var("GOOGLE_CLOUD_PROJECT").unwrap_or_default(),
                service_account: env::var("CLOUD_TASKS_SERVICE_ACCOUNT").ok(),
                service_url: env::var("SERVICE_URL").unwrap_or_default(),
                rate_limits: (rate_limits != RateLimits::default()).then_some(rate_limits),
                retry_config: (retry_config != RetryConfig::default()).then_some(retry_config),
            },

            port: parse_env("PORT").unwrap_or(8080),

            tasks_api_url: env::var("CLOUD_TASKS_API_URL")
                .unwrap_or_else(|_| DEFAULT_TASKS_API_URL.to_string()),

            access_token: env::var("CLOUD_TASKS_ACCESS_TOKEN").ok(),

            tokeninfo_url: env::var("OIDC_TOKENINFO_URL")
                .unwrap_or_else(|_| DEFAULT_TOKENINFO_URL.to_string()),

            queues: parse_csv("CLOUD_TASKS_QUEUES").unwrap_or_default(),
        }
    }
}

/// Parse an optional environment variable, warning on malformed values.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, ignoring");
            None
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
