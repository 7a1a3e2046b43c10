//! In-memory graph store for testing.

use crate::error::{StoreError, StoreResult};
use crate::graph::{GraphEdgeUpsert, GraphNodeUpsert, GraphStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tandem_core::{EntityId, Record};

/// A stored graph edge: endpoints plus properties.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    /// Source node id.
    pub source: EntityId,
    /// Target node id.
    pub target: EntityId,
    /// Edge properties.
    pub properties: Record,
}

/// An in-memory graph store.
///
/// Upserts overwrite, removals are no-ops on missing ids - the same
/// idempotent semantics the engine assumes of a real graph store.
///
/// # Failure injection
///
/// [`MemoryGraphStore::fail_next`] makes the next `n` trait calls fail,
/// for exercising the swallow-and-continue secondary path.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    nodes: RwLock<BTreeMap<EntityId, Record>>,
    edges: RwLock<BTreeMap<EntityId, StoredEdge>>,
    fail_next: AtomicU32,
}

impl MemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a node's properties.
    #[must_use]
    pub fn node(&self, id: &EntityId) -> Option<Record> {
        self.nodes.read().get(id).cloned()
    }

    /// Reads an edge.
    #[must_use]
    pub fn edge(&self, id: &EntityId) -> Option<StoredEdge> {
        self.edges.read().get(id).cloned()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    /// Returns a full snapshot for equality assertions.
    #[must_use]
    pub fn snapshot(&self) -> (BTreeMap<EntityId, Record>, BTreeMap<EntityId, StoredEdge>) {
        (self.nodes.read().clone(), self.edges.read().clone())
    }

    /// Makes the next `n` trait calls fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> StoreResult<()> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::unavailable("injected graph failure"));
        }
        Ok(())
    }
}

impl GraphStore for MemoryGraphStore {
    fn upsert_nodes(&self, nodes: &[GraphNodeUpsert]) -> StoreResult<()> {
        self.check_injected_failure()?;
        let mut table = self.nodes.write();
        for upsert in nodes {
            table.insert(upsert.id.clone(), upsert.properties.clone());
        }
        Ok(())
    }

    fn upsert_edges(&self, edges: &[GraphEdgeUpsert]) -> StoreResult<()> {
        self.check_injected_failure()?;
        let mut table = self.edges.write();
        for upsert in edges {
            table.insert(
                upsert.id.clone(),
                StoredEdge {
                    source: upsert.source.clone(),
                    target: upsert.target.clone(),
                    properties: upsert.properties.clone(),
                },
            );
        }
        Ok(())
    }

    fn remove_nodes(&self, ids: &[EntityId]) -> StoreResult<()> {
        self.check_injected_failure()?;
        let mut table = self.nodes.write();
        for id in ids {
            table.remove(id);
        }
        Ok(())
    }

    fn remove_edges(&self, ids: &[EntityId]) -> StoreResult<()> {
        self.check_injected_failure()?;
        let mut table = self.edges.write();
        for id in ids {
            table.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn node(id: &str, data: serde_json::Value) -> GraphNodeUpsert {
        GraphNodeUpsert {
            id: id.into(),
            properties: record(data),
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = MemoryGraphStore::new();
        let batch = vec![node("n1", json!({"name": "x"})), node("n2", json!({}))];

        store.upsert_nodes(&batch).unwrap();
        let first = store.snapshot();

        store.upsert_nodes(&batch).unwrap();
        assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn upsert_overwrites_properties() {
        let store = MemoryGraphStore::new();
        store.upsert_nodes(&[node("n1", json!({"name": "old"}))]).unwrap();
        store.upsert_nodes(&[node("n1", json!({"name": "new"}))]).unwrap();

        assert_eq!(store.node(&"n1".into()).unwrap()["name"], json!("new"));
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn remove_missing_is_noop() {
        let store = MemoryGraphStore::new();
        store.remove_nodes(&["ghost".into()]).unwrap();
        store.remove_edges(&["ghost".into()]).unwrap();
    }

    #[test]
    fn injected_failures_count_down() {
        let store = MemoryGraphStore::new();
        store.fail_next(1);

        assert!(store.upsert_nodes(&[]).is_err());
        assert!(store.upsert_nodes(&[]).is_ok());
    }

    #[test]
    fn edges_keep_endpoints() {
        let store = MemoryGraphStore::new();
        store
            .upsert_edges(&[GraphEdgeUpsert {
                id: "e1".into(),
                source: "a".into(),
                target: "b".into(),
                properties: record(json!({"kind": "link"})),
            }])
            .unwrap();

        let edge = store.edge(&"e1".into()).unwrap();
        assert_eq!(edge.source.as_str(), "a");
        assert_eq!(edge.target.as_str(), "b");
    }
}
