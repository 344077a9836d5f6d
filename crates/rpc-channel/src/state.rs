//! Connectivity states reported by a channel.

use std::fmt;

/// The transport's self-reported lifecycle state.
///
/// States follow the usual RPC channel lifecycle: a lazily dialed channel
/// starts in `Idle`, moves through `Connecting` to `Ready`, may fall back to
/// `TransientFailure` when the session is lost, and ends in `Shutdown`.
/// `Shutdown` is terminal: no transition ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// The channel has no session and is not attempting to create one.
    Idle,
    /// A session is being established.
    Connecting,
    /// The session is established and usable.
    Ready,
    /// The session was lost; a lazily dialed channel will retry.
    TransientFailure,
    /// The channel was closed and cannot be revived.
    Shutdown,
}

impl ConnectivityState {
    /// Whether this state can ever transition to another state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == ConnectivityState::Shutdown
    }

    /// Whether a caller could issue a call on the channel right now.
    #[must_use]
    pub fn is_usable(self) -> bool {
        self == ConnectivityState::Ready
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Idle => "idle",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Ready => "ready",
            ConnectivityState::TransientFailure => "transient-failure",
            ConnectivityState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}
