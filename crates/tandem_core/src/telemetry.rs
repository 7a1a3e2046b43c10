//! Rolling engine telemetry counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Rolling counters for the sync engine.
///
/// All counters are atomic and readable while flushes are in progress.
/// Counters only ever grow until [`EngineTelemetry::reset`] is called.
#[derive(Debug, Default)]
pub struct EngineTelemetry {
    /// Total number of completed flushes (successful transactions).
    flushes: AtomicU64,
    /// Total number of deltas committed across all flushes.
    deltas_processed: AtomicU64,
    /// Cumulative flush duration, in microseconds.
    flush_duration_micros: AtomicU64,
    /// Total number of failed flushes (retries exhausted).
    errors: AtomicU64,
}

impl EngineTelemetry {
    /// Creates a zeroed telemetry register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful flush of `deltas` deltas taking `duration`.
    pub fn record_flush(&self, deltas: usize, duration: Duration) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.deltas_processed
            .fetch_add(deltas as u64, Ordering::Relaxed);
        self.flush_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Records a flush that failed after exhausting retries.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.flushes.store(0, Ordering::Relaxed);
        self.deltas_processed.store(0, Ordering::Relaxed);
        self.flush_duration_micros.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let flushes = self.flushes.load(Ordering::Relaxed);
        let total = Duration::from_micros(self.flush_duration_micros.load(Ordering::Relaxed));

        TelemetrySnapshot {
            flushes,
            deltas_processed: self.deltas_processed.load(Ordering::Relaxed),
            flush_duration_total: total,
            average_flush_duration: if flushes == 0 {
                Duration::ZERO
            } else {
                total / flushes as u32
            },
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of [`EngineTelemetry`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    /// Total completed flushes.
    pub flushes: u64,
    /// Total deltas committed.
    pub deltas_processed: u64,
    /// Cumulative flush duration.
    pub flush_duration_total: Duration,
    /// Average duration per flush (zero when no flush has completed).
    pub average_flush_duration: Duration,
    /// Total flushes that failed after exhausting retries.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let telemetry = EngineTelemetry::new();
        let snap = telemetry.snapshot();
        assert_eq!(snap.flushes, 0);
        assert_eq!(snap.average_flush_duration, Duration::ZERO);
    }

    #[test]
    fn records_flushes_and_averages() {
        let telemetry = EngineTelemetry::new();
        telemetry.record_flush(3, Duration::from_millis(10));
        telemetry.record_flush(2, Duration::from_millis(20));

        let snap = telemetry.snapshot();
        assert_eq!(snap.flushes, 2);
        assert_eq!(snap.deltas_processed, 5);
        assert_eq!(snap.flush_duration_total, Duration::from_millis(30));
        assert_eq!(snap.average_flush_duration, Duration::from_millis(15));
    }

    #[test]
    fn records_errors() {
        let telemetry = EngineTelemetry::new();
        telemetry.record_error();
        telemetry.record_error();
        assert_eq!(telemetry.snapshot().errors, 2);
    }

    #[test]
    fn reset_clears_everything() {
        let telemetry = EngineTelemetry::new();
        telemetry.record_flush(10, Duration::from_millis(5));
        telemetry.record_error();

        telemetry.reset();
        assert_eq!(telemetry.snapshot(), TelemetrySnapshot::default());
    }
}
