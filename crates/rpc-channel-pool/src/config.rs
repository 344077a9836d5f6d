//! Pool configuration.

use std::time::Duration;

use rpc_channel::DialOptions;

use crate::error::PoolError;

/// How the pool establishes channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialMode {
    /// Dial synchronously; establishment failures surface to the caller.
    #[default]
    Blocking,
    /// Return channels immediately and let them connect in the background.
    Lazy,
}

/// Configuration for a channel pool.
///
/// Immutable once the pool is constructed.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Address of the RPC endpoint all channels dial.
    pub target: String,

    /// Maximum number of channels issued plus idle (default: 10).
    pub max_capacity: usize,

    /// How long an acquire may wait for a channel (default: 3s).
    pub acquire_timeout: Duration,

    /// Whether acquire may dial beyond `max_capacity` instead of blocking
    /// for a free slot (default: true).
    pub overflow_allowed: bool,

    /// Dial mode used when pre-warming the pool (default: blocking).
    pub dial_mode: DialMode,

    /// Transport dial options (default: insecure, 100s connect timeout).
    pub dial_options: DialOptions,
}

impl PoolConfig {
    /// Create a configuration for `target` with default values.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            max_capacity: 10,
            acquire_timeout: Duration::from_secs(3),
            overflow_allowed: true,
            dial_mode: DialMode::Blocking,
            dial_options: DialOptions::default(),
        }
    }

    /// Reject configurations the pool cannot operate with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.target.is_empty() {
            return Err(PoolError::Config("target address is empty".to_string()));
        }
        if self.max_capacity == 0 {
            return Err(PoolError::Config(
                "max_capacity must be greater than zero".to_string(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::Config(
                "acquire_timeout must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::new("localhost:8765");
        assert_eq!(config.max_capacity, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert!(config.overflow_allowed);
        assert_eq!(config.dial_mode, DialMode::Blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut config = PoolConfig::new("localhost:8765");
        config.max_capacity = 0;
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_zero_acquire_timeout_is_rejected() {
        let mut config = PoolConfig::new("localhost:8765");
        config.acquire_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_empty_target_is_rejected() {
        let config = PoolConfig::new("");
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }
}
