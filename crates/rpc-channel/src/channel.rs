//! Channel handle and dialing.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::ChannelError;
use crate::options::DialOptions;
use crate::state::ConnectivityState;

/// An opaque handle to one live transport session.
///
/// A channel is owned by exactly one holder at a time; it is deliberately
/// not `Clone`. The session itself lives inside a background monitor task,
/// so the handle only exposes the target, the connectivity state and
/// [`close`](Channel::close).
///
/// Dropping the handle closes the channel.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    target: String,
    state: watch::Sender<ConnectivityState>,
}

impl Channel {
    /// Dial `target` and wait for the session to be established.
    ///
    /// Fails with [`ChannelError::DialTimeout`] once the connect timeout in
    /// `options` elapses, or [`ChannelError::DialFailed`] on a transport
    /// refusal. The returned channel is in the `Ready` state; if the session
    /// is later lost it moves to `TransientFailure` and stays there (only
    /// lazily dialed channels reconnect).
    pub async fn connect(
        target: impl Into<String>,
        options: &DialOptions,
    ) -> Result<Self, ChannelError> {
        let target = target.into();
        let stream = dial_tcp(&target, options).await?;
        tracing::debug!(target = %target, "channel session established");

        let channel = Self::with_state(target, ConnectivityState::Ready);
        let inner = Arc::clone(&channel.inner);
        tokio::spawn(async move {
            if monitor_session(&inner, &stream).await == SessionEnd::Lost {
                inner.set_state(ConnectivityState::TransientFailure);
            }
        });
        Ok(channel)
    }

    /// Create a channel for `target` without waiting for a session.
    ///
    /// The channel starts in the `Idle` state; a background task then drives
    /// it through `Connecting` towards `Ready`, retrying failed dials with
    /// the backoff schedule from `options` until the channel is closed.
    #[must_use]
    pub fn connect_lazy(target: impl Into<String>, options: &DialOptions) -> Self {
        let channel = Self::with_state(target.into(), ConnectivityState::Idle);
        let inner = Arc::clone(&channel.inner);
        let options = options.clone();
        tokio::spawn(run_lazy_session(inner, options));
        channel
    }

    fn with_state(target: String, state: ConnectivityState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            inner: Arc::new(ChannelInner { target, state }),
        }
    }

    /// The address this channel dials.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Snapshot of the current connectivity state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    /// Wait until the state differs from `current` or `wait` elapses.
    ///
    /// Returns the new state, or `None` if no change was observed in time.
    pub async fn wait_for_state_change(
        &self,
        current: ConnectivityState,
        wait: Duration,
    ) -> Option<ConnectivityState> {
        let mut rx = self.inner.state.subscribe();
        match timeout(wait, rx.wait_for(|state| *state != current)).await {
            Ok(Ok(state)) => Some(*state),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Close the channel, tearing down the session and any background tasks.
    ///
    /// Idempotent; the state becomes `Shutdown` and never changes again.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    /// Whether the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectivityState::Shutdown
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("target", &self.inner.target)
            .field("state", &self.state())
            .finish()
    }
}

impl ChannelInner {
    /// Apply a state transition unless the channel is already shut down.
    ///
    /// Returns `false` when the transition was refused.
    fn set_state(&self, next: ConnectivityState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                false
            } else {
                tracing::trace!(from = %state, to = %next, "channel state change");
                *state = next;
                true
            }
        })
    }

    fn shutdown(&self) {
        let closed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = ConnectivityState::Shutdown;
                true
            }
        });
        if closed {
            tracing::debug!(target = %self.target, "channel closed");
        }
    }
}

/// How a monitored session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The channel was closed by its owner.
    Closed,
    /// The peer closed the session or the socket failed.
    Lost,
}

async fn dial_tcp(target: &str, options: &DialOptions) -> Result<TcpStream, ChannelError> {
    let stream = timeout(options.connect_timeout, TcpStream::connect(target))
        .await
        .map_err(|_| ChannelError::DialTimeout {
            target: target.to_string(),
            timeout: options.connect_timeout,
        })?
        .map_err(|source| ChannelError::DialFailed {
            target: target.to_string(),
            source,
        })?;
    if options.nodelay {
        stream
            .set_nodelay(true)
            .map_err(|source| ChannelError::DialFailed {
                target: target.to_string(),
                source,
            })?;
    }
    Ok(stream)
}

/// Watch a session until the channel is closed or the session is lost.
///
/// The session is considered lost on peer EOF or a socket error. Incoming
/// bytes are discarded; this crate never interprets the wire.
async fn monitor_session(inner: &ChannelInner, stream: &TcpStream) -> SessionEnd {
    let mut shutdown = inner.state.subscribe();
    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            changed = shutdown.wait_for(|state| state.is_terminal()) => {
                let _ = changed;
                return SessionEnd::Closed;
            }
            readable = stream.readable() => {
                if readable.is_err() {
                    return SessionEnd::Lost;
                }
                match stream.try_read(&mut buf) {
                    Ok(0) => return SessionEnd::Lost,
                    Ok(_) => {}
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => return SessionEnd::Lost,
                }
            }
        }
    }
}

/// Drive a lazily dialed channel: connect, monitor, back off, reconnect.
async fn run_lazy_session(inner: Arc<ChannelInner>, options: DialOptions) {
    let mut delay = options.backoff.initial;
    loop {
        if !inner.set_state(ConnectivityState::Connecting) {
            return;
        }
        match dial_tcp(&inner.target, &options).await {
            Ok(stream) => {
                if !inner.set_state(ConnectivityState::Ready) {
                    return;
                }
                delay = options.backoff.initial;
                if monitor_session(&inner, &stream).await == SessionEnd::Closed {
                    return;
                }
                if !inner.set_state(ConnectivityState::TransientFailure) {
                    return;
                }
            }
            Err(error) => {
                tracing::debug!(target = %inner.target, %error, "lazy dial attempt failed");
                if !inner.set_state(ConnectivityState::TransientFailure) {
                    return;
                }
            }
        }

        // Interruptible backoff sleep so close() is not delayed.
        let mut shutdown = inner.state.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|state| state.is_terminal()) => return,
        }
        delay = options.backoff.next(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn spawn_listener() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_blocking_connect_is_ready() {
        let (addr, server) = spawn_listener().await;
        let channel = Channel::connect(addr.to_string(), &DialOptions::new())
            .await
            .unwrap();
        assert_eq!(channel.state(), ConnectivityState::Ready);
        assert_eq!(channel.target(), addr.to_string());
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_refused_is_dial_failed() {
        // Bind then drop to find a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Channel::connect(addr.to_string(), &DialOptions::new()).await;
        assert!(matches!(result, Err(ChannelError::DialFailed { .. })));
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_idempotent() {
        let (addr, server) = spawn_listener().await;
        let channel = Channel::connect(addr.to_string(), &DialOptions::new())
            .await
            .unwrap();
        channel.close();
        channel.close();
        assert!(channel.is_closed());
        // No later transition may leave Shutdown.
        let changed = channel
            .wait_for_state_change(ConnectivityState::Shutdown, Duration::from_millis(50))
            .await;
        assert_eq!(changed, None);
        server.abort();
    }

    #[tokio::test]
    async fn test_lazy_connect_starts_idle_then_becomes_ready() {
        let (addr, server) = spawn_listener().await;
        let channel = Channel::connect_lazy(addr.to_string(), &DialOptions::new());
        // The driver task has not run yet on the current-thread runtime.
        assert_eq!(channel.state(), ConnectivityState::Idle);

        let mut state = channel.state();
        for _ in 0..4 {
            if state == ConnectivityState::Ready {
                break;
            }
            state = channel
                .wait_for_state_change(state, Duration::from_secs(2))
                .await
                .unwrap();
        }
        assert_eq!(state, ConnectivityState::Ready);
        server.abort();
    }

    #[tokio::test]
    async fn test_lazy_connect_failure_is_transient_and_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let options = DialOptions::new().backoff(crate::options::ReconnectBackoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(20),
            multiplier: 2.0,
        });
        let channel = Channel::connect_lazy(addr.to_string(), &options);

        let mut state = channel.state();
        for _ in 0..4 {
            if state == ConnectivityState::TransientFailure {
                break;
            }
            state = channel
                .wait_for_state_change(state, Duration::from_secs(2))
                .await
                .unwrap();
        }
        assert_eq!(state, ConnectivityState::TransientFailure);

        // The retry loop keeps cycling back to Connecting until closed.
        let next = channel
            .wait_for_state_change(ConnectivityState::TransientFailure, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(next, ConnectivityState::Connecting);
        channel.close();
    }

    #[tokio::test]
    async fn test_peer_close_moves_ready_to_transient_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Close the session from the peer side.
            drop(stream);
        });

        let channel = Channel::connect(addr.to_string(), &DialOptions::new())
            .await
            .unwrap();
        server.await.unwrap();

        let state = channel
            .wait_for_state_change(ConnectivityState::Ready, Duration::from_secs(2))
            .await;
        assert_eq!(state, Some(ConnectivityState::TransientFailure));
    }
}
