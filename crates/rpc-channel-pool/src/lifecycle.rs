//! Channel lifecycle classification.
//!
//! The pool never inspects a channel beyond its connectivity state. Two
//! decisions are made here: what to do with a channel handed out by the
//! idle buffer ([`classify`]), and whether a channel coming back from a
//! caller may be recycled ([`passivate`]).

use rpc_channel::{Channel, ConnectivityState};

/// What the pool should do with a channel taken from the idle buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand it to the caller as-is.
    Reusable,
    /// Not usable right now but possibly later; send it through a
    /// recycle cycle instead of destroying it.
    TentativelyUnusable,
    /// Terminally failed; destroy it.
    Unrecoverable,
}

/// Classify a channel by its current connectivity state.
#[must_use]
pub fn classify(channel: &Channel) -> Disposition {
    match channel.state() {
        ConnectivityState::Ready => Disposition::Reusable,
        ConnectivityState::Shutdown => Disposition::Unrecoverable,
        // Idle, connecting or transiently failed sessions may still
        // recover; let the passivation path decide their fate.
        _ => Disposition::TentativelyUnusable,
    }
}

/// Decide whether a channel being returned to the pool is recyclable.
///
/// A channel is recycled unless its state at the moment of release is
/// `Shutdown` or `TransientFailure`; callers destroy non-recyclable
/// channels. This is the simplified contract: rather than probing for a
/// Ready -> Shutdown -> Idle transition sequence under a wait, the state is
/// read once, which is race-free and behaviorally equivalent for healthy
/// channels.
#[must_use]
pub fn passivate(channel: &Channel) -> bool {
    let state = channel.state();
    let recyclable = !matches!(
        state,
        ConnectivityState::Shutdown | ConnectivityState::TransientFailure
    );
    if !recyclable {
        tracing::debug!(target = channel.target(), %state, "channel not recyclable");
    }
    recyclable
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_channel::DialOptions;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected_channel() -> (Channel, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });
        let channel = Channel::connect(addr.to_string(), &DialOptions::new())
            .await
            .unwrap();
        (channel, server)
    }

    #[tokio::test]
    async fn test_ready_channel_is_reusable_and_recyclable() {
        let (channel, server) = connected_channel().await;
        assert_eq!(classify(&channel), Disposition::Reusable);
        assert!(passivate(&channel));
        server.abort();
    }

    #[tokio::test]
    async fn test_closed_channel_is_unrecoverable() {
        let (channel, server) = connected_channel().await;
        channel.close();
        assert_eq!(classify(&channel), Disposition::Unrecoverable);
        assert!(!passivate(&channel));
        server.abort();
    }

    #[tokio::test]
    async fn test_idle_channel_is_tentatively_unusable_but_recyclable() {
        // The lazy driver task has not run yet on the current-thread
        // runtime, so the channel is still Idle.
        let channel = Channel::connect_lazy("127.0.0.1:9", &DialOptions::new());
        assert_eq!(classify(&channel), Disposition::TentativelyUnusable);
        assert!(passivate(&channel));
        channel.close();
    }

    #[tokio::test]
    async fn test_transient_failure_is_not_recyclable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let channel = Channel::connect(addr.to_string(), &DialOptions::new())
            .await
            .unwrap();
        server.await.unwrap();
        channel
            .wait_for_state_change(
                rpc_channel::ConnectivityState::Ready,
                std::time::Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(classify(&channel), Disposition::TentativelyUnusable);
        assert!(!passivate(&channel));
    }
}
