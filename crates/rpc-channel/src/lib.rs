//! # rpc-channel
//!
//! Opaque client channel to a remote RPC endpoint, with connectivity-state
//! tracking.
//!
//! A [`Channel`] represents one live transport session. It deliberately does
//! not expose framing, multiplexing or call semantics; consumers (such as
//! `rpc-channel-pool`) interact with it purely through its target, its
//! self-reported [`ConnectivityState`] and [`Channel::close`].
//!
//! Two dial modes are supported:
//!
//! - [`Channel::connect`] establishes the session before returning, bounded
//!   by the configured connect timeout.
//! - [`Channel::connect_lazy`] returns immediately; a background task drives
//!   the session towards `Ready`, retrying with exponential backoff.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rpc_channel::{Channel, DialOptions};
//!
//! let options = DialOptions::new();
//! let channel = Channel::connect("localhost:8765", &options).await?;
//! assert!(channel.state().is_usable());
//! channel.close();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod options;
pub mod retry;
pub mod state;

pub use channel::Channel;
pub use error::ChannelError;
pub use options::{DialOptions, ReconnectBackoff};
pub use retry::{MethodConfig, RetryPolicy, ServiceConfig, ServiceName};
pub use state::ConnectivityState;
