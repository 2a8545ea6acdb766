//! Cloud Tasks resource types, as exchanged with the REST API.
//!
//! Durations travel as protobuf-JSON strings (`"1.500s"`) and timestamps as
//! RFC 3339 strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{RateLimits, RetryConfig};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

// =============================================================================
// Duration
// =============================================================================

/// Service-native duration: whole seconds plus a sub-second nanos part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

impl Duration {
    pub fn from_millis(millis: u64) -> Self {
        let millis = i64::try_from(millis).unwrap_or(i64::MAX);
        Duration {
            seconds: millis / 1000,
            nanos: ((millis % 1000) * NANOS_PER_MILLI) as i32,
        }
    }

    /// Milliseconds represented by this duration. The sub-second part, when
    /// present, contributes its milliseconds on top of the whole seconds.
    pub fn as_millis(&self) -> u64 {
        let millis = self
            .seconds
            .saturating_mul(1000)
            .saturating_add(i64::from(self.nanos) / NANOS_PER_MILLI);
        u64::try_from(millis).unwrap_or(0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.seconds < 0 || self.nanos < 0;
        let seconds = self.seconds.unsigned_abs();
        let nanos = self.nanos.unsigned_abs();
        let sign = if negative { "-" } else { "" };

        if nanos == 0 {
            write!(f, "{}{}s", sign, seconds)
        } else if nanos % 1_000_000 == 0 {
            write!(f, "{}{}.{:03}s", sign, seconds, nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            write!(f, "{}{}.{:06}s", sign, seconds, nanos / 1_000)
        } else {
            write!(f, "{}{}.{:09}s", sign, seconds, nanos)
        }
    }
}

/// Error returned when a duration string is not of the form `<seconds>[.<fraction>]s`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{0}'")]
pub struct ParseDurationError(String);

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDurationError(raw.to_string());

        let body = raw.trim().strip_suffix('s').ok_or_else(invalid)?;
        let (negative, body) = match body.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));

        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || fraction.len() > 9 || !digits_only(whole) || !digits_only(fraction) {
            return Err(invalid());
        }

        let seconds: i64 = whole.parse().map_err(|_| invalid())?;
        let nanos: i64 = if fraction.is_empty() {
            0
        } else {
            let digits: i64 = fraction.parse().map_err(|_| invalid())?;
            digits * 10_i64.pow(9 - fraction.len() as u32)
        };

        debug_assert!(nanos < NANOS_PER_SECOND);

        let sign = if negative { -1 } else { 1 };
        Ok(Duration {
            seconds: sign * seconds,
            nanos: (sign * nanos) as i32,
        })
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Retry policy in the service's representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_backoff: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_doublings: Option<i32>,
}

impl From<&RetryConfig> for QueueRetryConfig {
    /// Only fields present in the declared config are carried over.
    fn from(declared: &RetryConfig) -> Self {
        QueueRetryConfig {
            max_attempts: declared.max_attempts,
            max_retry_duration: declared.max_retry_duration.map(Duration::from_millis),
            min_backoff: declared.min_backoff.map(Duration::from_millis),
            max_backoff: declared.max_backoff.map(Duration::from_millis),
            max_doublings: declared.max_doublings,
        }
    }
}

/// The service's view of a queue.
///
/// Blocks left as `None` are omitted on the wire, so an update carrying a
/// `None` block leaves that block untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQueue {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<QueueRetryConfig>,
    #[serde(default, skip_serializing)]
    pub state: Option<String>,
}

impl RemoteQueue {
    /// Field mask naming the blocks this descriptor carries.
    pub fn update_mask(&self) -> String {
        let mut fields = Vec::new();
        if self.rate_limits.is_some() {
            fields.push("rateLimits");
        }
        if self.retry_config.is_some() {
            fields.push("retryConfig");
        }
        fields.join(",")
    }
}

// =============================================================================
// Task
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
}

/// Request for an OIDC identity token to be attached to the delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcToken {
    pub service_account_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

/// The HTTP request the service sends back when the task is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub url: String,
    pub http_method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64-encoded body
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_token: Option<OidcToken>,
}

/// Task descriptor submitted to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub http_request: HttpRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_deadline: Option<Duration>,
}
