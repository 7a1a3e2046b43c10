//! Best-effort streaming propagation to the secondary graph store.

use std::sync::Arc;
use tandem_core::{edge_endpoints, Delta, DeltaOp, EntityId, Record, SyncConfig};
use tandem_store::{GraphEdgeUpsert, GraphNodeUpsert, GraphStore, PrimaryStore};
use tracing::{debug, warn};

/// Streams committed batches into the graph store incrementally.
///
/// Everything here is best-effort: the batch has already committed to the
/// primary store, so any failure is logged and swallowed - the graph store
/// is allowed to lag and a separate full-resync procedure is the repair
/// path. Cost is proportional to the batch, never to the store: upserts for
/// insert/update, explicit removes for delete, no full-relation rebuilds.
#[derive(Debug)]
pub struct GraphSync<P, G> {
    primary: Arc<P>,
    graph: Arc<G>,
}

impl<P: PrimaryStore, G: GraphStore> GraphSync<P, G> {
    /// Creates a graph sync over both stores.
    pub fn new(primary: Arc<P>, graph: Arc<G>) -> Self {
        Self { primary, graph }
    }

    /// Propagates one committed batch. Node deltas sync before edge deltas
    /// so the graph never observes an edge without its endpoints.
    pub fn sync_batch(&self, deltas: &[Delta], config: &SyncConfig) {
        let mut node_upserts = Vec::new();
        let mut node_removes = Vec::new();
        let mut edge_upserts = Vec::new();
        let mut edge_removes = Vec::new();

        for delta in deltas {
            if delta.class.is_node() {
                match self.node_payload(delta) {
                    Payload::Upsert(properties) => node_upserts.push(GraphNodeUpsert {
                        id: delta.id.clone(),
                        properties,
                    }),
                    Payload::Remove => node_removes.push(delta.id.clone()),
                    Payload::Skip => {}
                }
            } else {
                if !config.enable_edge_sync {
                    continue;
                }
                match self.edge_payload(delta) {
                    Payload::Upsert(properties) => match edge_endpoints(&delta.id, &properties) {
                        Ok((source, target)) => edge_upserts.push(GraphEdgeUpsert {
                            id: delta.id.clone(),
                            source,
                            target,
                            properties,
                        }),
                        Err(err) => {
                            warn!(entity = %delta.id, %err, "skipping malformed edge in graph sync");
                        }
                    },
                    Payload::Remove => edge_removes.push(delta.id.clone()),
                    Payload::Skip => {}
                }
            }
        }

        for chunk in node_upserts.chunks(config.batch_size.max(1)) {
            if let Err(err) = self.graph.upsert_nodes(chunk) {
                warn!(%err, nodes = chunk.len(), "graph node upsert failed, store will lag");
            }
        }
        self.remove(&node_removes, true);

        for chunk in edge_upserts.chunks(config.batch_size.max(1)) {
            if let Err(err) = self.graph.upsert_edges(chunk) {
                warn!(%err, edges = chunk.len(), "graph edge upsert failed, store will lag");
            }
        }
        self.remove(&edge_removes, false);

        debug!(
            node_upserts = node_upserts.len(),
            node_removes = node_removes.len(),
            edge_upserts = edge_upserts.len(),
            edge_removes = edge_removes.len(),
            "graph sync pass complete"
        );
    }

    fn remove(&self, ids: &[EntityId], nodes: bool) {
        if ids.is_empty() {
            return;
        }
        let outcome = if nodes {
            self.graph.remove_nodes(ids)
        } else {
            self.graph.remove_edges(ids)
        };
        if let Err(err) = outcome {
            warn!(%err, count = ids.len(), "graph removal failed, store will lag");
        }
    }

    /// Resolves a node delta into its full upsert payload.
    ///
    /// Update deltas carry only patches; the committed row is read back
    /// from the primary store because graph upserts always write the full
    /// property set.
    fn node_payload(&self, delta: &Delta) -> Payload {
        match &delta.op {
            DeltaOp::Insert(data) | DeltaOp::Replace(data) => Payload::Upsert(data.clone()),
            DeltaOp::Delete => Payload::Remove,
            DeltaOp::Update(_) => self.read_back(delta, self.primary.get_node(&delta.id)),
        }
    }

    fn edge_payload(&self, delta: &Delta) -> Payload {
        match &delta.op {
            DeltaOp::Insert(data) | DeltaOp::Replace(data) => Payload::Upsert(data.clone()),
            DeltaOp::Delete => Payload::Remove,
            DeltaOp::Update(_) => self.read_back(delta, self.primary.get_edge(&delta.id)),
        }
    }

    fn read_back(
        &self,
        delta: &Delta,
        row: Result<Option<Record>, tandem_store::StoreError>,
    ) -> Payload {
        match row {
            Ok(Some(record)) => Payload::Upsert(record),
            Ok(None) => {
                warn!(entity = %delta.id, "updated row missing from primary store, skipping");
                Payload::Skip
            }
            Err(err) => {
                warn!(entity = %delta.id, %err, "primary read-back failed, skipping");
                Payload::Skip
            }
        }
    }
}

enum Payload {
    Upsert(Record),
    Remove,
    Skip,
}
