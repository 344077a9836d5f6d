//! Channel-level error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while establishing a channel.
///
/// Both variants are terminal for the attempt in question; the caller
/// decides whether to retry.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The dial did not complete within the connect timeout.
    #[error(
        "dial to {target} timed out after {timeout:?}, \
         check the address configuration or network status"
    )]
    DialTimeout {
        /// The address that was being dialed.
        target: String,
        /// The connect timeout that elapsed.
        timeout: Duration,
    },

    /// The transport refused or failed the dial outright.
    #[error("dial to {target} failed: {source}")]
    DialFailed {
        /// The address that was being dialed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
