//! The sync engine orchestrator.

use crate::collector::DeltaCollector;
use crate::graph_sync::GraphSync;
use crate::hydration::{HydratedGraph, Hydrator};
use crate::status::{Subscription, SyncStateHandle, SyncStatus};
use crate::writer::{TransactionResult, TransactionWriter};
use crate::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tandem_core::{
    DeltaOp, EngineTelemetry, EntityClass, EntityId, FieldPatch, Record, SyncConfig,
    SyncConfigOverrides, TelemetrySnapshot,
};
use tandem_store::{GraphStore, PrimaryStore};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Operation selector for the legacy dirty-marking surface.
///
/// New call sites use the typed `track_*` methods; this enum exists so the
/// old `(id, operation, data?, changed_fields?)` shape keeps working as a
/// thin adapter over the same internal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyOperation {
    /// The entity was created.
    Insert,
    /// The entity changed.
    Update,
    /// The entity was removed.
    Delete,
}

/// The delta-based dual-store synchronization engine.
///
/// One engine owns one sync domain: construct it explicitly and pass the
/// handle around - there is no global instance, and independent engines
/// (including ones inside unit tests) never share state.
///
/// Tracking calls are synchronous and non-blocking from any caller
/// context; [`SyncEngine::force_flush`] and [`SyncEngine::hydrate`] are the
/// only operations to await. Call [`SyncEngine::start`] once a runtime is
/// available to arm the timer-driven flush path, and
/// [`SyncEngine::shutdown`] before process exit - pending deltas live only
/// in memory.
pub struct SyncEngine<P, G> {
    inner: Arc<EngineInner<P, G>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

struct EngineInner<P, G> {
    config: RwLock<Arc<SyncConfig>>,
    collector: DeltaCollector,
    writer: TransactionWriter<P>,
    graph_sync: GraphSync<P, G>,
    hydrator: Hydrator<P>,
    primary: Arc<P>,
    state: SyncStateHandle,
    telemetry: EngineTelemetry,
    /// Serializes the primary write path: one transaction in flight at a
    /// time. A flush wanting to run while one is in flight is not queued;
    /// the collector keeps accumulating and its timers re-fire.
    flush_lock: tokio::sync::Mutex<()>,
    /// Introspection mirror of `flush_lock`.
    is_flushing: AtomicBool,
    /// Set when the pending-count threshold demands an immediate flush.
    flush_requested: AtomicBool,
    wake: Notify,
    shutting_down: AtomicBool,
}

impl<P, G> SyncEngine<P, G>
where
    P: PrimaryStore + 'static,
    G: GraphStore + 'static,
{
    /// Creates an engine over the given stores.
    pub fn new(config: SyncConfig, primary: Arc<P>, graph: Arc<G>) -> Self {
        let state = SyncStateHandle::new();

        Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(Arc::new(config)),
                collector: DeltaCollector::new(),
                writer: TransactionWriter::new(Arc::clone(&primary)),
                graph_sync: GraphSync::new(Arc::clone(&primary), graph),
                hydrator: Hydrator::new(Arc::clone(&primary), state.clone()),
                primary,
                state,
                telemetry: EngineTelemetry::new(),
                flush_lock: tokio::sync::Mutex::new(()),
                is_flushing: AtomicBool::new(false),
                flush_requested: AtomicBool::new(false),
                wake: Notify::new(),
                shutting_down: AtomicBool::new(false),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Spawns the background flush driver. Idempotent.
    ///
    /// Until the driver runs, deltas still accumulate and coalesce but only
    /// [`SyncEngine::force_flush`] drains them.
    pub fn start(&self) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *driver = Some(tokio::spawn(async move {
            Self::run_driver(inner).await;
        }));
    }

    // === Tracking API ===

    /// Tracks a node insertion.
    pub fn track_node_insert(&self, id: impl Into<EntityId>, data: Record) {
        self.track(id.into(), EntityClass::Node, DeltaOp::Insert(data));
    }

    /// Tracks a field-level node update.
    pub fn track_node_update(&self, id: impl Into<EntityId>, patches: Vec<FieldPatch>) {
        self.track(id.into(), EntityClass::Node, DeltaOp::Update(patches));
    }

    /// Tracks a full-row node update.
    pub fn track_node_replace(&self, id: impl Into<EntityId>, data: Record) {
        self.track(id.into(), EntityClass::Node, DeltaOp::Replace(data));
    }

    /// Tracks a node deletion.
    pub fn track_node_delete(&self, id: impl Into<EntityId>) {
        self.track(id.into(), EntityClass::Node, DeltaOp::Delete);
    }

    /// Tracks an edge insertion.
    pub fn track_edge_insert(&self, id: impl Into<EntityId>, data: Record) {
        self.track(id.into(), EntityClass::Edge, DeltaOp::Insert(data));
    }

    /// Tracks a field-level edge update.
    pub fn track_edge_update(&self, id: impl Into<EntityId>, patches: Vec<FieldPatch>) {
        self.track(id.into(), EntityClass::Edge, DeltaOp::Update(patches));
    }

    /// Tracks a full-row edge update.
    pub fn track_edge_replace(&self, id: impl Into<EntityId>, data: Record) {
        self.track(id.into(), EntityClass::Edge, DeltaOp::Replace(data));
    }

    /// Tracks an edge deletion.
    pub fn track_edge_delete(&self, id: impl Into<EntityId>) {
        self.track(id.into(), EntityClass::Edge, DeltaOp::Delete);
    }

    /// Legacy dirty-marking surface for nodes.
    pub fn mark_node_dirty(
        &self,
        id: impl Into<EntityId>,
        operation: DirtyOperation,
        data: Option<Record>,
        changed_fields: Option<Vec<FieldPatch>>,
    ) {
        self.mark_dirty(id.into(), EntityClass::Node, operation, data, changed_fields);
    }

    /// Legacy dirty-marking surface for edges.
    pub fn mark_edge_dirty(
        &self,
        id: impl Into<EntityId>,
        operation: DirtyOperation,
        data: Option<Record>,
        changed_fields: Option<Vec<FieldPatch>>,
    ) {
        self.mark_dirty(id.into(), EntityClass::Edge, operation, data, changed_fields);
    }

    fn mark_dirty(
        &self,
        id: EntityId,
        class: EntityClass,
        operation: DirtyOperation,
        data: Option<Record>,
        changed_fields: Option<Vec<FieldPatch>>,
    ) {
        let op = match operation {
            DirtyOperation::Insert => match data {
                Some(data) => DeltaOp::Insert(data),
                None => {
                    warn!(entity = %id, "insert marked dirty without payload, ignoring");
                    return;
                }
            },
            DirtyOperation::Update => match (changed_fields, data) {
                (Some(patches), _) => DeltaOp::Update(patches),
                (None, Some(data)) => DeltaOp::Replace(data),
                (None, None) => {
                    warn!(entity = %id, "update marked dirty without payload, ignoring");
                    return;
                }
            },
            DirtyOperation::Delete => DeltaOp::Delete,
        };
        self.track(id, class, op);
    }

    /// The single internal tracking path.
    fn track(&self, id: EntityId, class: EntityClass, op: DeltaOp) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            warn!(entity = %id, "tracking call after shutdown, ignoring");
            return;
        }

        let config = self.config_snapshot();
        let outcome = self.inner.collector.record(id, class, op, &config);

        let (nodes, edges) = self.inner.collector.dirty_counts();
        self.inner.state.update(|s| {
            s.dirty_node_count = nodes;
            s.dirty_edge_count = edges;
        });

        if outcome.threshold_reached {
            self.inner.flush_requested.store(true, Ordering::SeqCst);
        }
        self.inner.wake.notify_one();
    }

    // === Control API ===

    /// Drains pending deltas immediately, bypassing timers, and awaits the
    /// resulting transaction (waiting first for any flush already in
    /// flight).
    ///
    /// A failed transaction is not an error here: the batch is re-queued
    /// and `last_error` is set, exactly as for a timer-driven flush.
    pub async fn force_flush(&self) -> TransactionResult {
        let guard = self.inner.flush_lock.lock().await;
        Self::flush_locked(&self.inner, guard).await
    }

    /// Applies a partial configuration update as a fresh snapshot,
    /// propagated to every component from the next operation on.
    pub fn set_config(&self, overrides: SyncConfigOverrides) {
        let mut config = self.inner.config.write();
        let next = overrides.apply_to(&config);
        debug!(?next, "configuration swapped");
        *config = Arc::new(next);
        drop(config);
        self.inner.wake.notify_one();
    }

    /// Returns a copy of the active configuration snapshot.
    #[must_use]
    pub fn config(&self) -> SyncConfig {
        (**self.inner.config.read()).clone()
    }

    /// Returns true when at least one delta is pending.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.inner.collector.has_pending_changes()
    }

    /// Returns the number of pending deltas.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.collector.pending_count()
    }

    /// Returns true while a primary-store transaction is in flight.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.is_flushing.load(Ordering::SeqCst)
    }

    // === Observability API ===

    /// Subscribes to status updates; the current status replays
    /// immediately.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.subscribe(listener)
    }

    /// Returns a copy of the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.state.status()
    }

    /// Returns a snapshot of the rolling telemetry counters.
    #[must_use]
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.inner.telemetry.snapshot()
    }

    /// Zeroes the telemetry counters.
    pub fn reset_telemetry(&self) {
        self.inner.telemetry.reset();
    }

    // === Startup / shutdown ===

    /// Hydrates application memory from the primary store.
    ///
    /// Small stores load in one pass; stores above the configured
    /// threshold load progressively so the UI stays responsive.
    pub async fn hydrate(&self) -> EngineResult<HydratedGraph> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShuttingDown);
        }

        let config = self.config_snapshot();
        let total_nodes = self.inner.primary.count_nodes()?;

        if total_nodes > config.progressive_threshold {
            self.inner.hydrator.hydrate_progressive(&config).await
        } else {
            self.inner.hydrator.hydrate_all().await
        }
    }

    /// Flushes pending deltas and stops the driver task.
    pub async fn shutdown(&self) -> TransactionResult {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();

        let result = self.force_flush().await;

        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        result
    }

    // === Internals ===

    fn config_snapshot(&self) -> Arc<SyncConfig> {
        self.inner.config.read().clone()
    }

    async fn run_driver(inner: Arc<EngineInner<P, G>>) {
        debug!("flush driver started");
        loop {
            if inner.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            let deadline = inner.collector.next_deadline();
            tokio::select! {
                _ = inner.wake.notified() => {
                    if inner.flush_requested.swap(false, Ordering::SeqCst) {
                        Self::process_batch(&inner).await;
                    }
                    // Otherwise: a deadline moved or config changed; loop
                    // around and recompute the sleep.
                }
                _ = Self::sleep_until(deadline) => {
                    Self::process_batch(&inner).await;
                }
            }
        }
        debug!("flush driver stopped");
    }

    async fn sleep_until(deadline: Option<tokio::time::Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Timer/threshold entry point: skips silently when a flush is already
    /// in flight.
    async fn process_batch(inner: &Arc<EngineInner<P, G>>) {
        let Ok(guard) = inner.flush_lock.try_lock() else {
            return;
        };
        Self::flush_locked(inner, guard).await;
    }

    /// The single serialization point for the primary write path.
    async fn flush_locked(
        inner: &Arc<EngineInner<P, G>>,
        _guard: tokio::sync::MutexGuard<'_, ()>,
    ) -> TransactionResult {
        inner.is_flushing.store(true, Ordering::SeqCst);
        let config = inner.config.read().clone();
        let batch = inner.collector.take_batch();

        if batch.is_empty() {
            inner.is_flushing.store(false, Ordering::SeqCst);
            return TransactionResult {
                success: true,
                ..TransactionResult::default()
            };
        }

        debug!(deltas = batch.len(), "flushing batch");
        inner.state.update(|s| s.is_syncing = true);

        let result = inner.writer.execute(&batch, &config).await;

        if result.success {
            if config.enable_secondary_sync {
                inner.graph_sync.sync_batch(&batch, &config);
            }
            inner.telemetry.record_flush(batch.len(), result.duration);

            let (nodes, edges) = inner.collector.dirty_counts();
            inner.state.update(|s| {
                s.is_syncing = false;
                s.last_sync_time = Some(SystemTime::now());
                s.last_error = None;
                s.dirty_node_count = nodes;
                s.dirty_edge_count = edges;
            });
        } else {
            inner.telemetry.record_error();
            let message = result
                .errors
                .last()
                .cloned()
                .unwrap_or_else(|| "transaction failed".to_owned());
            warn!(deltas = batch.len(), error = %message, "flush failed, re-queuing batch");

            inner.collector.requeue(batch, &config);

            let (nodes, edges) = inner.collector.dirty_counts();
            inner.state.update(|s| {
                s.is_syncing = false;
                s.last_error = Some(message);
                s.dirty_node_count = nodes;
                s.dirty_edge_count = edges;
            });
            // The requeue re-armed the collector's timers; nudge the driver
            // so it picks the new deadline up.
            inner.wake.notify_one();
        }

        inner.is_flushing.store(false, Ordering::SeqCst);
        result
    }
}

impl<P, G> Drop for SyncEngine<P, G> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

impl<P, G> std::fmt::Debug for SyncEngine<P, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("pending", &self.inner.collector.pending_count())
            .field("is_flushing", &self.inner.is_flushing.load(Ordering::SeqCst))
            .finish()
    }
}
