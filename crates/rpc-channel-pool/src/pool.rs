//! Channel pool implementation.
//!
//! This module provides a purpose-built pool of client channels to a single
//! RPC endpoint, with connectivity-based lifecycle management on both the
//! checkout and the release path.

use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::Mutex;
use rpc_channel::{Channel, DialOptions, RetryPolicy, ServiceConfig};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::timeout;

use crate::config::{DialMode, PoolConfig};
use crate::error::PoolError;
use crate::lifecycle::{self, Disposition};

/// Deadline for re-enqueueing a returned channel into the idle buffer.
/// When it elapses the channel is destroyed rather than leaking the
/// release task.
const RETURN_TIMEOUT: Duration = Duration::from_secs(3);

/// A bounded pool of reusable channels to one RPC endpoint.
///
/// The pool owns an idle buffer of established channels, pre-warmed to full
/// capacity at construction, and an in-flight counter of channels currently
/// checked out. Acquisition classifies idle channels by connectivity state
/// and dials new sessions when permitted; release happens asynchronously
/// when the [`PooledChannel`] guard is dropped.
///
/// One `Pool` instance is shared by reference between all callers for the
/// life of the process: `construct -> serve -> shutdown`.
///
/// # Example
///
/// ```rust,ignore
/// use rpc_channel_pool::Pool;
/// use std::time::Duration;
///
/// let pool = Pool::builder("localhost:8765")
///     .max_capacity(10)
///     .acquire_timeout(Duration::from_secs(3))
///     .overflow_allowed(true)
///     .build()
///     .await?;
///
/// let channel = pool.acquire().await?;
/// // Issue calls on `channel`...
/// drop(channel);
///
/// let stats = pool.stats();
/// pool.shutdown().await;
/// ```
pub struct Pool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    /// Pool configuration, immutable after construction.
    config: PoolConfig,

    /// Producer half of the idle buffer (release path and pre-warm).
    idle_tx: mpsc::Sender<Channel>,

    /// Consumer half of the idle buffer (acquire path and shutdown).
    idle_rx: AsyncMutex<mpsc::Receiver<Channel>>,

    /// Channels currently checked out by callers.
    in_flight: AtomicI64,

    /// Cleared exactly once by shutdown; no channel is re-enqueued after.
    accepting: AtomicBool,

    /// Wakes one capacity waiter per release event.
    released: Notify,

    /// Serializes shutdown against itself.
    shutdown_lock: AsyncMutex<()>,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total channels dialed.
    channels_created: u64,
    /// Total channels destroyed.
    channels_destroyed: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, dial errors, shutdown).
    checkouts_failed: u64,
    /// Total returned channels re-enqueued into the idle buffer.
    recycles_performed: u64,
}

impl Pool {
    /// Create a new pool builder for `target`.
    #[must_use]
    pub fn builder(target: impl Into<String>) -> PoolBuilder {
        PoolBuilder::new(target)
    }

    /// Create a pool with the given configuration.
    ///
    /// The idle buffer is pre-warmed to full capacity. In blocking dial mode
    /// every pre-warm dial is synchronous and any failure aborts
    /// construction: already-dialed channels are destroyed and no pool is
    /// returned.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let (idle_tx, idle_rx) = mpsc::channel(config.max_capacity);
        let shared = Arc::new(PoolShared {
            idle_tx,
            idle_rx: AsyncMutex::new(idle_rx),
            in_flight: AtomicI64::new(0),
            accepting: AtomicBool::new(true),
            released: Notify::new(),
            shutdown_lock: AsyncMutex::new(()),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            config,
        });
        let pool = Self { shared };
        pool.prewarm().await?;

        tracing::info!(
            target = %pool.shared.config.target,
            capacity = pool.shared.config.max_capacity,
            "channel pool created"
        );
        Ok(pool)
    }

    /// Positional constructor for simpler callers.
    ///
    /// Equivalent to `Pool::builder(target)` with the given capacity,
    /// acquire timeout and overflow policy, and defaults everywhere else.
    pub async fn connect(
        target: impl Into<String>,
        max_capacity: usize,
        acquire_timeout: Duration,
        overflow_allowed: bool,
    ) -> Result<Self, PoolError> {
        let mut config = PoolConfig::new(target);
        config.max_capacity = max_capacity;
        config.acquire_timeout = acquire_timeout;
        config.overflow_allowed = overflow_allowed;
        Self::new(config).await
    }

    /// Fill the idle buffer to capacity.
    async fn prewarm(&self) -> Result<(), PoolError> {
        let config = &self.shared.config;
        for _ in 0..config.max_capacity {
            let channel = match config.dial_mode {
                DialMode::Blocking => {
                    match Channel::connect(config.target.as_str(), &config.dial_options).await {
                        Ok(channel) => channel,
                        Err(error) => {
                            tracing::warn!(
                                target = %config.target,
                                %error,
                                "pre-warm dial failed; aborting pool construction"
                            );
                            self.drain_idle().await;
                            return Err(error.into());
                        }
                    }
                }
                DialMode::Lazy => {
                    Channel::connect_lazy(config.target.as_str(), &config.dial_options)
                }
            };
            self.shared.metrics.lock().channels_created += 1;
            if self.shared.idle_tx.try_send(channel).is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn drain_idle(&self) {
        let mut rx = self.shared.idle_rx.lock().await;
        while let Ok(channel) = rx.try_recv() {
            self.shared.destroy(channel);
        }
    }

    /// Check a channel out of the pool.
    ///
    /// Waits up to the configured acquire timeout for an idle channel to
    /// become usable or for permission to dial. Callers may wrap the
    /// returned future in their own, earlier deadline. On failure the
    /// in-flight counter is never left incremented.
    ///
    /// # Errors
    ///
    /// - [`PoolError::AcquireTimeout`] when no channel became available in
    ///   time.
    /// - [`PoolError::ShutdownInProgress`] after [`shutdown`](Pool::shutdown).
    /// - [`PoolError::Channel`] when dialing a new session failed.
    pub async fn acquire(&self) -> Result<PooledChannel, PoolError> {
        let wait = self.shared.config.acquire_timeout;
        let result = match timeout(wait, self.acquire_inner()).await {
            Ok(inner) => inner,
            Err(_) => Err(PoolError::AcquireTimeout { timeout: wait }),
        };
        let mut metrics = self.shared.metrics.lock();
        match &result {
            Ok(_) => metrics.checkouts_successful += 1,
            Err(_) => metrics.checkouts_failed += 1,
        }
        drop(metrics);
        result
    }

    async fn acquire_inner(&self) -> Result<PooledChannel, PoolError> {
        loop {
            if !self.shared.accepting.load(Ordering::Acquire) {
                return Err(PoolError::ShutdownInProgress);
            }

            let idle = {
                let mut rx = self.shared.idle_rx.lock().await;
                match rx.try_recv() {
                    Ok(channel) => Some(channel),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
                }
            };
            if let Some(channel) = idle {
                match lifecycle::classify(&channel) {
                    Disposition::Reusable => return Ok(self.checkout(channel)),
                    Disposition::TentativelyUnusable => {
                        // Send it through a recycle cycle. The channel was
                        // never checked out, so the in-flight counter is
                        // untouched.
                        PoolShared::spawn_return(&self.shared, channel, false);
                        continue;
                    }
                    Disposition::Unrecoverable => {
                        self.shared.destroy(channel);
                        continue;
                    }
                }
            }

            let config = &self.shared.config;
            if !config.overflow_allowed
                && self.shared.in_flight.load(Ordering::Acquire) >= config.max_capacity as i64
            {
                // Suspend until a release frees a slot or returns a channel.
                // The surrounding acquire timeout bounds this wait.
                self.shared.released.notified().await;
                continue;
            }

            // Acquisition always dials synchronously, bounded by the earlier
            // of the connect timeout and the remaining acquire deadline.
            let channel = Channel::connect(config.target.as_str(), &config.dial_options).await?;
            self.shared.metrics.lock().channels_created += 1;
            return Ok(self.checkout(channel));
        }
    }

    fn checkout(&self, channel: Channel) -> PooledChannel {
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(target = channel.target(), "channel checked out");
        PooledChannel {
            channel: Some(channel),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Read-only snapshot of pool usage.
    ///
    /// Lock-free; values may be stale by a moment under concurrency.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_flight: self.shared.in_flight.load(Ordering::Acquire),
            idle: self.shared.idle_tx.max_capacity() - self.shared.idle_tx.capacity(),
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.shared.metrics.lock();
        PoolMetrics {
            channels_created: inner.channels_created,
            channels_destroyed: inner.channels_destroyed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            recycles_performed: inner.recycles_performed,
            uptime: self.shared.created_at.elapsed(),
        }
    }

    /// Whether the pool has been shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        !self.shared.accepting.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Tear the pool down.
    ///
    /// Serialized and idempotent: stops accepting returns, closes the idle
    /// buffer for insertion and destroys every idle channel. Channels
    /// checked out at this point are destroyed by their own release path
    /// once it observes the pool no longer accepts returns. Safe to call
    /// concurrently with in-flight acquisitions, which fail fast with
    /// [`PoolError::ShutdownInProgress`].
    pub async fn shutdown(&self) {
        let _guard = self.shared.shutdown_lock.lock().await;
        if !self.shared.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        let mut drained = 0usize;
        {
            let mut rx = self.shared.idle_rx.lock().await;
            rx.close();
            while let Ok(channel) = rx.try_recv() {
                self.shared.destroy(channel);
                drained += 1;
            }
        }
        // Wake pending acquires so they fail fast instead of timing out.
        self.shared.released.notify_waiters();

        tracing::info!(
            target = %self.shared.config.target,
            drained,
            "channel pool shut down"
        );
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("target", &self.shared.config.target)
            .field("in_flight", &stats.in_flight)
            .field("idle", &stats.idle)
            .finish()
    }
}

impl PoolShared {
    /// Spawn the detached release path for a channel.
    ///
    /// `checked_out` channels decrement the in-flight counter exactly once
    /// when the path completes, even if passivation panics. Without a
    /// current runtime (guard dropped outside tokio) the return degrades to
    /// a synchronous, non-blocking best effort.
    fn spawn_return(shared: &Arc<Self>, channel: Channel, checked_out: bool) {
        let shared = Arc::clone(shared);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let outcome = AssertUnwindSafe(shared.requeue(channel)).catch_unwind().await;
                    if outcome.is_err() {
                        tracing::error!("channel release task panicked; channel destroyed");
                    }
                    if checked_out {
                        shared.finish_release();
                    }
                });
            }
            Err(_) => {
                shared.requeue_sync(channel);
                if checked_out {
                    shared.finish_release();
                }
            }
        }
    }

    /// Passivate a returned channel and re-enqueue or destroy it.
    async fn requeue(&self, channel: Channel) {
        if !lifecycle::passivate(&channel) {
            self.destroy(channel);
            return;
        }
        if !self.accepting.load(Ordering::Acquire) {
            self.destroy(channel);
            return;
        }
        match timeout(RETURN_TIMEOUT, self.idle_tx.send(channel)).await {
            Ok(Ok(())) => {
                self.metrics.lock().recycles_performed += 1;
                self.released.notify_one();
                // A shutdown may have raced the enqueue; reclaim what we can
                // so no channel survives in a closed buffer.
                if !self.accepting.load(Ordering::Acquire) {
                    self.reclaim_idle();
                }
            }
            Ok(Err(send_error)) => {
                // Buffer closed for insertion by shutdown.
                self.destroy(send_error.0);
            }
            Err(_) => {
                // The timed-out send future owned the channel and closed it
                // on drop; account for the destruction here.
                tracing::debug!("idle buffer full; returned channel destroyed");
                self.metrics.lock().channels_destroyed += 1;
            }
        }
    }

    /// Non-blocking fallback used when no runtime is available.
    fn requeue_sync(&self, channel: Channel) {
        if !lifecycle::passivate(&channel) || !self.accepting.load(Ordering::Acquire) {
            self.destroy(channel);
            return;
        }
        match self.idle_tx.try_send(channel) {
            Ok(()) => {
                self.metrics.lock().recycles_performed += 1;
                self.released.notify_one();
            }
            Err(error) => self.destroy(error.into_inner()),
        }
    }

    fn reclaim_idle(&self) {
        if let Ok(mut rx) = self.idle_rx.try_lock() {
            while let Ok(channel) = rx.try_recv() {
                self.destroy(channel);
            }
        }
    }

    fn finish_release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "in-flight counter underflow");
        self.released.notify_one();
    }

    fn destroy(&self, channel: Channel) {
        tracing::trace!(target = channel.target(), "destroying channel");
        channel.close();
        self.metrics.lock().channels_destroyed += 1;
    }
}

/// A channel checked out of the pool.
///
/// Dereferences to [`Channel`]. Dropping the guard returns the channel to
/// the pool asynchronously: the caller is never blocked, passivation runs
/// on a detached task, and the in-flight counter is decremented exactly
/// once whatever the outcome.
pub struct PooledChannel {
    channel: Option<Channel>,
    shared: Arc<PoolShared>,
}

impl PooledChannel {
    /// Detach the channel from the pool.
    ///
    /// The channel leaves pool accounting immediately and will not be
    /// returned to the idle buffer; the caller takes over its lifetime.
    #[must_use]
    pub fn detach(mut self) -> Channel {
        let channel = self.channel.take();
        self.shared.finish_release();
        match channel {
            Some(channel) => channel,
            None => unreachable!("guard already consumed"),
        }
    }
}

impl Deref for PooledChannel {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        match &self.channel {
            Some(channel) => channel,
            None => unreachable!("guard already consumed"),
        }
    }
}

impl Drop for PooledChannel {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            tracing::trace!(target = channel.target(), "returning channel to pool");
            PoolShared::spawn_return(&self.shared, channel, true);
        }
    }
}

impl std::fmt::Debug for PooledChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledChannel")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Builder for creating a channel pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder("localhost:8765")
///     .max_capacity(20)
///     .overflow_allowed(false)
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new pool builder for `target` with default settings.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            config: PoolConfig::new(target),
        }
    }

    /// Set the maximum number of channels issued plus idle.
    #[must_use]
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.config.max_capacity = capacity;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Allow or deny dialing beyond capacity.
    #[must_use]
    pub fn overflow_allowed(mut self, allowed: bool) -> Self {
        self.config.overflow_allowed = allowed;
        self
    }

    /// Set the dial mode used for pre-warming.
    #[must_use]
    pub fn dial_mode(mut self, mode: DialMode) -> Self {
        self.config.dial_mode = mode;
        self
    }

    /// Replace the transport dial options.
    #[must_use]
    pub fn dial_options(mut self, options: DialOptions) -> Self {
        self.config.dial_options = options;
        self
    }

    /// Attach a per-call retry policy for one logical service.
    ///
    /// The policy is carried to the transport in the service-config wire
    /// format; the pool itself never retries calls.
    #[must_use]
    pub fn retry_policy(mut self, service: impl Into<String>, policy: RetryPolicy) -> Self {
        self.config.dial_options.service_config =
            Some(ServiceConfig::for_service(service, policy));
        self
    }

    /// Build the pool, pre-warming the idle buffer.
    pub async fn build(self) -> Result<Pool, PoolError> {
        Pool::new(self.config).await
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Channels currently checked out by callers.
    pub in_flight: i64,
    /// Channels sitting in the idle buffer.
    pub idle: usize,
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total channels dialed since pool creation.
    pub channels_created: u64,
    /// Total channels destroyed since pool creation.
    pub channels_destroyed: u64,
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (timeouts, dial errors, shutdown).
    pub checkouts_failed: u64,
    /// Returned channels re-enqueued into the idle buffer.
    pub recycles_performed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Checkout success rate in `0.0..=1.0`.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}
