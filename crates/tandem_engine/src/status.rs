//! Observable sync status register.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// Which hydration phase is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HydrationPhase {
    /// Hydration has not started.
    #[default]
    Idle,
    /// Root-level plus recently-updated nodes.
    Critical,
    /// Children of critical container nodes.
    Visible,
    /// Every remaining node.
    Full,
    /// Edges for the whole graph.
    Complete,
    /// Hydration finished.
    Done,
}

impl fmt::Display for HydrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationPhase::Idle => write!(f, "idle"),
            HydrationPhase::Critical => write!(f, "critical"),
            HydrationPhase::Visible => write!(f, "visible"),
            HydrationPhase::Full => write!(f, "full"),
            HydrationPhase::Complete => write!(f, "complete"),
            HydrationPhase::Done => write!(f, "done"),
        }
    }
}

/// Granular hydration progress for UI progress bars.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HydrationProgress {
    /// Current phase.
    pub phase: HydrationPhase,
    /// Nodes resident so far.
    pub nodes_loaded: usize,
    /// Edges resident so far.
    pub edges_loaded: usize,
    /// Total nodes in the primary store.
    pub total_nodes: u64,
    /// Total edges in the primary store.
    pub total_edges: u64,
}

/// Process-wide sync status, consumed by the UI.
///
/// Two independent axes: the hydration lifecycle (idle → hydrating →
/// hydrated) and the sync lifecycle (idle ↔ syncing, with `last_error` and
/// `last_sync_time`), so either can be represented without conflating them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncStatus {
    /// Hydration is currently running.
    pub is_hydrating: bool,
    /// Hydration has completed successfully at least once.
    pub is_hydrated: bool,
    /// A primary-store flush is in flight.
    pub is_syncing: bool,
    /// Pending node deltas.
    pub dirty_node_count: usize,
    /// Pending edge deltas.
    pub dirty_edge_count: usize,
    /// When the last flush committed.
    pub last_sync_time: Option<SystemTime>,
    /// The last error message, cleared by the next successful flush.
    pub last_error: Option<String>,
    /// Granular hydration progress.
    pub hydration: HydrationProgress,
}

type Listener = Box<dyn Fn(&SyncStatus) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct StateInner {
    status: RwLock<SyncStatus>,
    listeners: RwLock<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
}

/// Handle to the engine's status register.
///
/// Created once at engine construction and never destroyed during the
/// process lifetime. Cloning shares the same register. Every mutation
/// notifies subscribers synchronously, and subscribing replays the current
/// status immediately.
#[derive(Clone, Default)]
pub struct SyncStateHandle {
    inner: Arc<StateInner>,
}

impl SyncStateHandle {
    /// Creates a fresh status register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status.read().clone()
    }

    /// Registers a listener and immediately replays the current status to
    /// it. Returns a disposer handle; dropping it (or calling
    /// [`Subscription::unsubscribe`]) removes the listener.
    pub fn subscribe(&self, listener: impl Fn(&SyncStatus) + Send + Sync + 'static) -> Subscription {
        let current = self.status();
        listener(&current);

        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push(ListenerEntry {
            id,
            listener: Box::new(listener),
        });

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Merges a change into the status and notifies every listener
    /// synchronously.
    pub fn update(&self, apply: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self.inner.status.write();
            apply(&mut status);
            status.clone()
        };

        let listeners = self.inner.listeners.read();
        for entry in listeners.iter() {
            (entry.listener)(&snapshot);
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl fmt::Debug for SyncStateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncStateHandle")
            .field("status", &self.status())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Disposer handle for a status subscription.
///
/// The listener stays registered until this handle is dropped or
/// [`Subscription::unsubscribe`] is called.
pub struct Subscription {
    inner: Weak<StateInner>,
    id: u64,
}

impl Subscription {
    /// Removes the listener now.
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.write().retain(|entry| entry.id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
