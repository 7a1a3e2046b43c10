//! Engine configuration.

use std::time::Duration;

/// Configuration for the synchronization engine.
///
/// A `SyncConfig` is an immutable snapshot: reconfiguration swaps the whole
/// snapshot via [`SyncConfigOverrides`], it never mutates one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last tracking call before a flush fires.
    /// Reset by every call.
    pub debounce: Duration,
    /// Upper bound on staleness: a collection window flushes this long
    /// after its first delta even under continuous mutation. Never reset.
    pub max_wait: Duration,
    /// Pending-delta count that forces an immediate flush, bounding memory
    /// growth under burst load.
    pub max_deltas_before_flush: usize,
    /// Statement batch size for the secondary store write path.
    pub batch_size: usize,
    /// Whether edge deltas are propagated to the secondary store.
    pub enable_edge_sync: bool,
    /// Whether the secondary store is written at all.
    pub enable_secondary_sync: bool,
    /// Number of retries after a failed primary-store transaction.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
    /// Node budget for the Critical hydration phase, split evenly between
    /// root nodes and recently-updated nodes.
    pub critical_limit: usize,
    /// Node budget for the Visible hydration phase.
    pub visible_limit: usize,
    /// Cooperative yield between hydration phases.
    pub yield_interval: Duration,
    /// Node count above which `hydrate()` selects the progressive path.
    pub progressive_threshold: u64,
}

impl SyncConfig {
    /// Creates a configuration with production-shaped defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_wait: Duration::from_secs(3),
            max_deltas_before_flush: 500,
            batch_size: 100,
            enable_edge_sync: true,
            enable_secondary_sync: true,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            critical_limit: 100,
            visible_limit: 200,
            yield_interval: Duration::from_millis(10),
            progressive_threshold: 500,
        }
    }

    /// Sets the debounce interval.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the max-wait staleness bound.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the pending-count flush threshold.
    #[must_use]
    pub fn with_max_deltas_before_flush(mut self, count: usize) -> Self {
        self.max_deltas_before_flush = count;
        self
    }

    /// Sets the secondary-store statement batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enables or disables edge propagation to the secondary store.
    #[must_use]
    pub fn with_edge_sync(mut self, enabled: bool) -> Self {
        self.enable_edge_sync = enabled;
        self
    }

    /// Enables or disables the secondary store entirely.
    #[must_use]
    pub fn with_secondary_sync(mut self, enabled: bool) -> Self {
        self.enable_secondary_sync = enabled;
        self
    }

    /// Sets the retry count for failed primary transactions.
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the base delay for retry backoff.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sets the Critical hydration phase budget.
    #[must_use]
    pub fn with_critical_limit(mut self, limit: usize) -> Self {
        self.critical_limit = limit;
        self
    }

    /// Sets the Visible hydration phase budget.
    #[must_use]
    pub fn with_visible_limit(mut self, limit: usize) -> Self {
        self.visible_limit = limit;
        self
    }

    /// Sets the cooperative yield between hydration phases.
    #[must_use]
    pub fn with_yield_interval(mut self, interval: Duration) -> Self {
        self.yield_interval = interval;
        self
    }

    /// Sets the progressive hydration node-count threshold.
    #[must_use]
    pub fn with_progressive_threshold(mut self, threshold: u64) -> Self {
        self.progressive_threshold = threshold;
        self
    }

    /// Backoff delay before retry `attempt` (0-indexed):
    /// `retry_base_delay * 2^attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial configuration update.
///
/// Fields left as `None` keep the current value; the result is a fresh
/// immutable [`SyncConfig`] snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfigOverrides {
    /// New debounce interval.
    pub debounce: Option<Duration>,
    /// New max-wait bound.
    pub max_wait: Option<Duration>,
    /// New pending-count threshold.
    pub max_deltas_before_flush: Option<usize>,
    /// New secondary batch size.
    pub batch_size: Option<usize>,
    /// New edge-sync toggle.
    pub enable_edge_sync: Option<bool>,
    /// New secondary-sync toggle.
    pub enable_secondary_sync: Option<bool>,
    /// New retry count.
    pub retry_attempts: Option<u32>,
    /// New retry base delay.
    pub retry_base_delay: Option<Duration>,
    /// New Critical phase budget.
    pub critical_limit: Option<usize>,
    /// New Visible phase budget.
    pub visible_limit: Option<usize>,
    /// New inter-phase yield.
    pub yield_interval: Option<Duration>,
    /// New progressive threshold.
    pub progressive_threshold: Option<u64>,
}

impl SyncConfigOverrides {
    /// Produces a new snapshot from `base` with these overrides applied.
    #[must_use]
    pub fn apply_to(&self, base: &SyncConfig) -> SyncConfig {
        SyncConfig {
            debounce: self.debounce.unwrap_or(base.debounce),
            max_wait: self.max_wait.unwrap_or(base.max_wait),
            max_deltas_before_flush: self
                .max_deltas_before_flush
                .unwrap_or(base.max_deltas_before_flush),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            enable_edge_sync: self.enable_edge_sync.unwrap_or(base.enable_edge_sync),
            enable_secondary_sync: self
                .enable_secondary_sync
                .unwrap_or(base.enable_secondary_sync),
            retry_attempts: self.retry_attempts.unwrap_or(base.retry_attempts),
            retry_base_delay: self.retry_base_delay.unwrap_or(base.retry_base_delay),
            critical_limit: self.critical_limit.unwrap_or(base.critical_limit),
            visible_limit: self.visible_limit.unwrap_or(base.visible_limit),
            yield_interval: self.yield_interval.unwrap_or(base.yield_interval),
            progressive_threshold: self
                .progressive_threshold
                .unwrap_or(base.progressive_threshold),
        }
    }
}
