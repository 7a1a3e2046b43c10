//! Delta collection: pending map, coalescing, and flush timing.

use parking_lot::Mutex;
use std::collections::HashMap;
use tandem_core::{Coalesced, Delta, DeltaOp, EntityClass, EntityId, SyncConfig};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Accumulates deltas and decides when a batch is due.
///
/// One pending delta exists per entity id; every tracking call coalesces
/// into it. Two deadlines govern a collection window:
///
/// - **debounce** - reset by every call; coalesces bursts into one flush
/// - **max-wait** - started by the window's first delta and never reset;
///   bounds staleness under continuous mutation
///
/// A third trigger is the pending-count threshold, checked on every call.
/// Flushing is the caller's job: the collector only reports deadlines and
/// swaps batches out atomically.
#[derive(Debug, Default)]
pub struct DeltaCollector {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<EntityId, PendingDelta>,
    window: WindowState,
    next_seq: u64,
}

#[derive(Debug)]
struct PendingDelta {
    delta: Delta,
    /// Arrival order, kept stable across coalesces so batches replay
    /// mutations in the order the caller issued them.
    seq: u64,
}

/// Per-window timer state.
#[derive(Debug, Default)]
enum WindowState {
    /// No deltas pending, no timers armed.
    #[default]
    Idle,
    /// A window is open and both deadlines are armed.
    Collecting {
        debounce_deadline: Instant,
        max_deadline: Instant,
    },
}

/// What a tracking call changed, from the flush driver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// The pending count now meets the flush threshold.
    pub threshold_reached: bool,
}

impl DeltaCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Coalesces one mutation into the pending map and re-arms timers.
    pub fn record(
        &self,
        id: EntityId,
        class: EntityClass,
        op: DeltaOp,
        config: &SyncConfig,
    ) -> RecordOutcome {
        let mut inner = self.inner.lock();

        match inner.pending.remove(&id) {
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.pending.insert(
                    id.clone(),
                    PendingDelta {
                        delta: Delta::new(id, class, op),
                        seq,
                    },
                );
            }
            Some(pending) => match pending.delta.coalesce(op) {
                Coalesced::Merged(delta) => {
                    inner.pending.insert(
                        id,
                        PendingDelta {
                            delta,
                            seq: pending.seq,
                        },
                    );
                }
                Coalesced::Cancelled => {
                    debug!(entity = %id, "insert+delete cancelled before reaching any store");
                }
                Coalesced::Dropped(delta) => {
                    warn!(entity = %id, "dropping mutation tracked after delete");
                    inner.pending.insert(
                        id,
                        PendingDelta {
                            delta,
                            seq: pending.seq,
                        },
                    );
                }
            },
        }

        inner.rearm(config);

        RecordOutcome {
            threshold_reached: inner.pending.len() >= config.max_deltas_before_flush,
        }
    }

    /// Atomically swaps out the whole pending set as an immutable batch.
    ///
    /// The collector is immediately ready for the next window. The batch is
    /// ordered with every node delta before every edge delta, and by
    /// arrival order within each class.
    #[must_use]
    pub fn take_batch(&self) -> Vec<Delta> {
        let mut inner = self.inner.lock();
        inner.window = WindowState::Idle;

        let mut entries: Vec<PendingDelta> = inner.pending.drain().map(|(_, p)| p).collect();
        entries.sort_by_key(|p| (p.delta.class.rank(), p.seq));
        entries.into_iter().map(|p| p.delta).collect()
    }

    /// Re-inserts a failed batch so no mutation is silently dropped.
    ///
    /// A delta whose entity gained a newer pending delta while the batch
    /// was in flight becomes the base, and the newer delta is coalesced on
    /// top of it - the newer mutation was issued against state the failed
    /// batch never committed.
    pub fn requeue(&self, batch: Vec<Delta>, config: &SyncConfig) {
        let mut inner = self.inner.lock();

        for failed in batch {
            let id = failed.id.clone();
            match inner.pending.remove(&id) {
                None => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.pending.insert(id, PendingDelta { delta: failed, seq });
                }
                Some(newer) => {
                    let newer_version = newer.delta.version;
                    match failed.coalesce(newer.delta.op) {
                        Coalesced::Merged(mut delta) => {
                            delta.version = delta.version.max(newer_version + 1);
                            inner.pending.insert(
                                id,
                                PendingDelta {
                                    delta,
                                    seq: newer.seq,
                                },
                            );
                        }
                        Coalesced::Cancelled => {
                            debug!(entity = %id, "requeued insert cancelled by pending delete");
                        }
                        Coalesced::Dropped(delta) => {
                            inner.pending.insert(
                                id,
                                PendingDelta {
                                    delta,
                                    seq: newer.seq,
                                },
                            );
                        }
                    }
                }
            }
        }

        // Requeued deltas must not stall: make sure timers are armed.
        inner.rearm(config);
    }

    /// Earliest armed deadline, or `None` when nothing is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let inner = self.inner.lock();
        match &inner.window {
            WindowState::Idle => None,
            WindowState::Collecting {
                debounce_deadline,
                max_deadline,
            } => Some((*debounce_deadline).min(*max_deadline)),
        }
    }

    /// Returns true when at least one delta is pending.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Returns the number of pending deltas.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns pending counts split by entity class: `(nodes, edges)`.
    #[must_use]
    pub fn dirty_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        let nodes = inner
            .pending
            .values()
            .filter(|p| p.delta.class.is_node())
            .count();
        (nodes, inner.pending.len() - nodes)
    }
}

impl Inner {
    /// Re-arms timers after a mutation: opens a window if none is open,
    /// resets the debounce deadline, never touches the max-wait deadline.
    fn rearm(&mut self, config: &SyncConfig) {
        if self.pending.is_empty() {
            self.window = WindowState::Idle;
            return;
        }

        let now = Instant::now();
        match &mut self.window {
            WindowState::Idle => {
                self.window = WindowState::Collecting {
                    debounce_deadline: now + config.debounce,
                    max_deadline: now + config.max_wait,
                };
            }
            WindowState::Collecting {
                debounce_deadline, ..
            } => {
                *debounce_deadline = now + config.debounce;
            }
        }
    }
}
