//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by pool construction and acquisition.
///
/// Failures on the release path are never surfaced: release is asynchronous
/// and has no caller to report to, so they are logged and the channel is
/// destroyed.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No channel became available within the acquire timeout.
    #[error(
        "acquiring a channel timed out after {timeout:?}; \
         allow overflow or increase the pool's maximum capacity"
    )]
    AcquireTimeout {
        /// The acquire timeout that elapsed.
        timeout: Duration,
    },

    /// The pool has been shut down; acquisition fails fast.
    #[error("pool is shut down")]
    ShutdownInProgress,

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// Channel establishment failed during acquisition or pre-warming.
    #[error(transparent)]
    Channel(#[from] rpc_channel::ChannelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_timeout_message_suggests_remedies() {
        let err = PoolError::AcquireTimeout {
            timeout: Duration::from_secs(3),
        };
        let message = err.to_string();
        assert!(message.contains("overflow"));
        assert!(message.contains("capacity"));
    }

    #[test]
    fn test_channel_error_is_transparent() {
        let err = PoolError::from(rpc_channel::ChannelError::DialTimeout {
            target: "localhost:8765".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(err.to_string().contains("timed out"));
    }
}
