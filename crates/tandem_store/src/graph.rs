//! Secondary (graph) store boundary.

use crate::error::StoreResult;
use tandem_core::{EntityId, Record};

/// An upsert of one node into the graph store.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNodeUpsert {
    /// The node id.
    pub id: EntityId,
    /// Full node properties (the graph store holds no partial rows).
    pub properties: Record,
}

/// An upsert of one edge into the graph store.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdgeUpsert {
    /// The edge id.
    pub id: EntityId,
    /// Source node id.
    pub source: EntityId,
    /// Target node id.
    pub target: EntityId,
    /// Full edge properties.
    pub properties: Record,
}

/// The derived, query-optimized graph store.
///
/// The graph store is eventually consistent with the primary store and is
/// written best-effort only. The boundary assumes per-statement durability
/// and nothing more: no multi-statement transactions, no read-modify-write.
///
/// # Invariants
///
/// - Every operation is idempotent: applying the same batch twice leaves
///   the store in the same state as applying it once
/// - Upserts carry the full property set (cost proportional to batch size,
///   never to store size)
/// - Removing a missing entity is a no-op
///
/// # Implementors
///
/// - [`crate::MemoryGraphStore`] - in-memory reference store for tests
pub trait GraphStore: Send + Sync {
    /// Upserts a batch of nodes.
    fn upsert_nodes(&self, nodes: &[GraphNodeUpsert]) -> StoreResult<()>;

    /// Upserts a batch of edges.
    ///
    /// Endpoint nodes are expected to exist; callers order node upserts
    /// before edge upserts.
    fn upsert_edges(&self, edges: &[GraphEdgeUpsert]) -> StoreResult<()>;

    /// Removes a batch of nodes.
    fn remove_nodes(&self, ids: &[EntityId]) -> StoreResult<()>;

    /// Removes a batch of edges.
    fn remove_edges(&self, ids: &[EntityId]) -> StoreResult<()>;
}
