//! Startup hydration: loading the primary store into memory.

use crate::status::{HydrationPhase, SyncStateHandle};
use crate::{EngineError, EngineResult};
use std::collections::HashSet;
use std::sync::Arc;
use tandem_core::{EntityId, SyncConfig};
use tandem_store::{EntityRow, PrimaryStore, StoreError};
use tracing::{debug, info};

/// Everything hydration loaded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HydratedGraph {
    /// Node rows, in load order (critical rows first under progressive
    /// hydration).
    pub nodes: Vec<EntityRow>,
    /// Edge rows.
    pub edges: Vec<EntityRow>,
    /// Number of nodes loaded.
    pub nodes_loaded: usize,
    /// Number of edges loaded.
    pub edges_loaded: usize,
}

/// Loads primary-store contents into memory at startup.
///
/// Two paths: [`Hydrator::hydrate_all`] bulk-loads everything in one pass
/// (small stores), [`Hydrator::hydrate_progressive`] loads in
/// priority-ordered phases with cooperative yields so the first paint does
/// not wait for the whole store. Any store failure aborts hydration and
/// propagates as a hard error; retrying is the caller's decision.
#[derive(Debug)]
pub struct Hydrator<P> {
    store: Arc<P>,
    state: SyncStateHandle,
}

impl<P: PrimaryStore> Hydrator<P> {
    /// Creates a hydrator feeding the given status register.
    pub fn new(store: Arc<P>, state: SyncStateHandle) -> Self {
        Self { store, state }
    }

    /// Loads every node and edge in one pass.
    pub async fn hydrate_all(&self) -> EngineResult<HydratedGraph> {
        self.begin(HydrationPhase::Full).await?;

        let nodes = self
            .store
            .all_nodes()
            .map_err(|e| self.abort(HydrationPhase::Full, e))?;
        self.push_progress(HydrationPhase::Complete, nodes.len(), 0);

        let edges = self
            .store
            .all_edges()
            .map_err(|e| self.abort(HydrationPhase::Complete, e))?;

        Ok(self.finish(nodes, edges))
    }

    /// Loads in four strictly ordered phases: critical, visible, full,
    /// then edges.
    pub async fn hydrate_progressive(&self, config: &SyncConfig) -> EngineResult<HydratedGraph> {
        self.begin(HydrationPhase::Critical).await?;

        let mut loaded: HashSet<EntityId> = HashSet::new();
        let mut nodes: Vec<EntityRow> = Vec::new();

        // Critical: roots plus recently-updated, split evenly, deduped.
        let half = config.critical_limit / 2;
        let roots = self
            .store
            .root_nodes(half)
            .map_err(|e| self.abort(HydrationPhase::Critical, e))?;
        extend_deduped(&mut nodes, &mut loaded, roots);

        let remaining = config.critical_limit.saturating_sub(nodes.len());
        let recent = self
            .store
            .recent_nodes(remaining)
            .map_err(|e| self.abort(HydrationPhase::Critical, e))?;
        extend_deduped(&mut nodes, &mut loaded, recent);

        let critical_ids: Vec<EntityId> = loaded.iter().cloned().collect();
        self.push_progress(HydrationPhase::Visible, nodes.len(), 0);
        self.yield_between_phases(config).await;

        // Visible: children of critical containers.
        let children = self
            .store
            .child_nodes(&critical_ids, config.visible_limit)
            .map_err(|e| self.abort(HydrationPhase::Visible, e))?;
        extend_deduped(&mut nodes, &mut loaded, children);
        self.push_progress(HydrationPhase::Full, nodes.len(), 0);
        self.yield_between_phases(config).await;

        // Full: everything not yet resident.
        let rest = self
            .store
            .all_nodes()
            .map_err(|e| self.abort(HydrationPhase::Full, e))?;
        extend_deduped(&mut nodes, &mut loaded, rest);
        self.push_progress(HydrationPhase::Complete, nodes.len(), 0);
        self.yield_between_phases(config).await;

        // Complete: edges last - cheap relative to nodes and meaningless
        // without their endpoints resident.
        let edges = self
            .store
            .all_edges()
            .map_err(|e| self.abort(HydrationPhase::Complete, e))?;

        Ok(self.finish(nodes, edges))
    }

    async fn begin(&self, phase: HydrationPhase) -> EngineResult<()> {
        let total_nodes = self
            .store
            .count_nodes()
            .map_err(|e| self.abort(phase, e))?;
        let total_edges = self
            .store
            .count_edges()
            .map_err(|e| self.abort(phase, e))?;

        info!(total_nodes, total_edges, "hydration starting");
        self.state.update(|s| {
            s.is_hydrating = true;
            s.hydration.phase = phase;
            s.hydration.nodes_loaded = 0;
            s.hydration.edges_loaded = 0;
            s.hydration.total_nodes = total_nodes;
            s.hydration.total_edges = total_edges;
        });
        Ok(())
    }

    fn push_progress(&self, next_phase: HydrationPhase, nodes_loaded: usize, edges_loaded: usize) {
        debug!(phase = %next_phase, nodes_loaded, edges_loaded, "hydration phase boundary");
        self.state.update(|s| {
            s.hydration.phase = next_phase;
            s.hydration.nodes_loaded = nodes_loaded;
            s.hydration.edges_loaded = edges_loaded;
        });
    }

    async fn yield_between_phases(&self, config: &SyncConfig) {
        tokio::time::sleep(config.yield_interval).await;
    }

    fn abort(&self, phase: HydrationPhase, source: StoreError) -> EngineError {
        let error = EngineError::HydrationFailed { phase, source };
        self.state.update(|s| {
            s.is_hydrating = false;
            s.last_error = Some(error.to_string());
        });
        error
    }

    fn finish(&self, nodes: Vec<EntityRow>, edges: Vec<EntityRow>) -> HydratedGraph {
        let graph = HydratedGraph {
            nodes_loaded: nodes.len(),
            edges_loaded: edges.len(),
            nodes,
            edges,
        };

        info!(
            nodes = graph.nodes_loaded,
            edges = graph.edges_loaded,
            "hydration complete"
        );
        self.state.update(|s| {
            s.is_hydrating = false;
            s.is_hydrated = true;
            s.hydration.phase = HydrationPhase::Done;
            s.hydration.nodes_loaded = graph.nodes_loaded;
            s.hydration.edges_loaded = graph.edges_loaded;
        });
        graph
    }
}

fn extend_deduped(
    nodes: &mut Vec<EntityRow>,
    loaded: &mut HashSet<EntityId>,
    rows: Vec<EntityRow>,
) {
    for row in rows {
        if loaded.insert(row.id.clone()) {
            nodes.push(row);
        }
    }
}
