//! Per-call retry policy and its service-config wire format.
//!
//! The pool never retries calls itself; it only carries this configuration
//! opaquely to the transport via [`DialOptions`](crate::DialOptions). The
//! JSON shape follows the gRPC service config contract, with durations
//! rendered as `"<seconds>s"` strings:
//!
//! ```json
//! {"methodConfig":[{"name":[{"service":"wso2.agent.api.APIService"}],
//!   "waitForReady":true,
//!   "retryPolicy":{"maxAttempts":10,"initialBackoff":"1s",
//!     "maxBackoff":"1000s","backoffMultiplier":1.0,
//!     "retryableStatusCodes":["UNAVAILABLE"]}}]}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Declarative retry parameters for calls on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the original call.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "seconds_string")]
    pub initial_backoff: Duration,

    /// Upper bound on the retry delay.
    #[serde(with = "seconds_string")]
    pub max_backoff: Duration,

    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,

    /// Status codes that make a failed call eligible for retry.
    pub retryable_status_codes: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(1000),
            backoff_multiplier: 1.0,
            retryable_status_codes: vec!["UNAVAILABLE".to_string()],
        }
    }
}

/// Service-level configuration object delivered to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Per-service method configuration entries.
    pub method_config: Vec<MethodConfig>,
}

impl ServiceConfig {
    /// Build a configuration that applies `policy` to all methods of one
    /// logical service, waiting for the service to become ready before
    /// failing a call.
    #[must_use]
    pub fn for_service(service: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            method_config: vec![MethodConfig {
                name: vec![ServiceName {
                    service: service.into(),
                }],
                wait_for_ready: Some(true),
                retry_policy: Some(policy),
            }],
        }
    }

    /// Render the wire-format JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Configuration for the methods matched by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    /// Logical services this entry applies to.
    pub name: Vec<ServiceName>,

    /// Whether calls wait for the service to become ready instead of
    /// failing fast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_ready: Option<bool>,

    /// Retry policy enforced by the transport on a per-call basis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

/// A logical service name selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceName {
    /// Fully qualified service name, e.g. `wso2.agent.api.APIService`.
    pub service: String,
}

/// Serde adapter for durations rendered as `"<seconds>s"` strings.
mod seconds_string {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let rendered = if value.subsec_nanos() == 0 {
            format!("{}s", value.as_secs())
        } else {
            format!("{}s", value.as_secs_f64())
        };
        rendered.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let stripped = raw
            .strip_suffix('s')
            .ok_or_else(|| serde::de::Error::custom(format!("duration `{raw}` missing `s` suffix")))?;
        let seconds: f64 = stripped
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid duration `{raw}`")))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid duration `{raw}`")));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}
