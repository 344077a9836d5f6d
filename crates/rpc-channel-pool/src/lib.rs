//! # rpc-channel-pool
//!
//! Purpose-built pool of reusable client channels to a single RPC endpoint.
//!
//! Many logical calls share a small, bounded set of expensive transport
//! sessions instead of dialing per call. The pool owns the lifecycle state
//! machine that decides whether a returned channel is reusable, tentatively
//! recyclable or dead, the acquisition protocol with overflow and timeout
//! semantics, and the asynchronous release path that returns channels
//! without blocking the caller.
//!
//! ## Features
//!
//! - Connectivity-state classification on checkout and release
//! - Bounded idle buffer pre-warmed at construction
//! - Overflow policy: dial beyond capacity, or block until a slot frees
//! - Detached, panic-contained release with a bounded re-enqueue step
//! - Lock-free stats and cumulative checkout metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use rpc_channel_pool::Pool;
//! use std::time::Duration;
//!
//! let pool = Pool::builder("localhost:8765")
//!     .max_capacity(10)
//!     .acquire_timeout(Duration::from_secs(3))
//!     .build()
//!     .await?;
//!
//! let channel = pool.acquire().await?;
//! // Issue calls on `channel`...
//! drop(channel); // returned to the pool asynchronously
//!
//! pool.shutdown().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::{DialMode, PoolConfig};

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStats, PooledChannel};

// Lifecycle management
pub use lifecycle::{Disposition, classify, passivate};

// Transport boundary re-exports for callers configuring dials.
pub use rpc_channel::{Channel, ChannelError, ConnectivityState, DialOptions, RetryPolicy};
