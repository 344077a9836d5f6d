//! Dial options.

use std::time::Duration;

use crate::retry::ServiceConfig;

/// Default connect timeout for a blocking dial.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(100);

/// Options applied when dialing a channel.
///
/// The defaults produce a plain (insecure) TCP session with a 100 second
/// connect timeout.
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Deadline for establishing the transport session.
    pub connect_timeout: Duration,

    /// Whether to set `TCP_NODELAY` on the session.
    pub nodelay: bool,

    /// Backoff schedule used by lazily dialed channels when reconnecting.
    pub backoff: ReconnectBackoff,

    /// Service configuration carried to the transport, including any
    /// per-call retry policy. The channel itself never interprets it.
    pub service_config: Option<ServiceConfig>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
            backoff: ReconnectBackoff::default(),
            service_config: None,
        }
    }
}

impl DialOptions {
    /// Create dial options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set the reconnect backoff schedule for lazily dialed channels.
    #[must_use]
    pub fn backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attach a service configuration (retry policy wire object).
    #[must_use]
    pub fn service_config(mut self, config: ServiceConfig) -> Self {
        self.service_config = Some(config);
        self
    }
}

/// Exponential backoff schedule for session re-establishment.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on the retry delay.
    pub max: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(120),
            multiplier: 1.6,
        }
    }
}

impl ReconnectBackoff {
    /// The delay that follows `current`, capped at the configured maximum.
    #[must_use]
    pub fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max)
    }
}
