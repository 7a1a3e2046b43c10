//! In-memory primary store for testing.

use crate::error::{StoreError, StoreResult};
use crate::primary::{EntityRow, PrimaryStore, RowOp, RowOpKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tandem_core::{apply_patches, EntityClass, EntityId, Record};

/// One row operation as committed, in commit order.
///
/// The applied-row log lets tests assert statement ordering (node
/// operations before edge operations, deletes before inserts) without
/// reaching into store internals.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedRow {
    /// The row id.
    pub id: EntityId,
    /// Node or edge table.
    pub class: EntityClass,
    /// Operation name (`insert`, `patch`, `replace`, `delete`).
    pub op: &'static str,
}

/// An in-memory primary store.
///
/// Suitable for unit and integration tests. Schema interpretation:
/// - A node is a root when it has no string `parent` field
/// - A node's parent is the node named by its `parent` field
/// - Recency ordering uses the numeric `updated_at` field (missing = 0)
///
/// # Failure injection
///
/// [`MemoryPrimaryStore::fail_next_applies`] makes the next `n` calls to
/// [`PrimaryStore::apply`] fail with a retryable error, for exercising the
/// retry and requeue paths.
#[derive(Debug, Default)]
pub struct MemoryPrimaryStore {
    nodes: RwLock<BTreeMap<EntityId, Record>>,
    edges: RwLock<BTreeMap<EntityId, Record>>,
    log: RwLock<Vec<AppliedRow>>,
    apply_calls: AtomicU64,
    fail_next: AtomicU32,
}

impl MemoryPrimaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a node row directly, bypassing the transaction path.
    pub fn seed_node(&self, id: impl Into<EntityId>, record: Record) {
        self.nodes.write().insert(id.into(), record);
    }

    /// Seeds an edge row directly, bypassing the transaction path.
    pub fn seed_edge(&self, id: impl Into<EntityId>, record: Record) {
        self.edges.write().insert(id.into(), record);
    }

    /// Reads a node row without going through the trait.
    #[must_use]
    pub fn node(&self, id: &EntityId) -> Option<Record> {
        self.nodes.read().get(id).cloned()
    }

    /// Reads an edge row without going through the trait.
    #[must_use]
    pub fn edge(&self, id: &EntityId) -> Option<Record> {
        self.edges.read().get(id).cloned()
    }

    /// Returns the applied-row log in commit order.
    #[must_use]
    pub fn applied_log(&self) -> Vec<AppliedRow> {
        self.log.read().clone()
    }

    /// Clears the applied-row log.
    pub fn clear_log(&self) {
        self.log.write().clear();
    }

    /// Returns how many times [`PrimaryStore::apply`] was called.
    #[must_use]
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `n` apply calls fail with a retryable error.
    pub fn fail_next_applies(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn is_root(record: &Record) -> bool {
        !record.get("parent").map(|v| v.is_string()).unwrap_or(false)
    }

    fn updated_at(record: &Record) -> u64 {
        record
            .get("updated_at")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }
}

impl PrimaryStore for MemoryPrimaryStore {
    fn apply(&self, ops: &[RowOp]) -> StoreResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::unavailable("injected failure"));
        }

        let mut nodes = self.nodes.write();
        let mut edges = self.edges.write();

        // Stage against copies so a mid-transaction failure rolls back.
        let mut staged_nodes = nodes.clone();
        let mut staged_edges = edges.clone();
        let mut staged_log = Vec::with_capacity(ops.len());

        for op in ops {
            let table = match op.class {
                EntityClass::Node => &mut staged_nodes,
                EntityClass::Edge => &mut staged_edges,
            };

            match &op.kind {
                RowOpKind::Insert(record) => {
                    if table.contains_key(&op.id) {
                        return Err(StoreError::Constraint(format!(
                            "duplicate {} id {}",
                            op.class, op.id
                        )));
                    }
                    table.insert(op.id.clone(), record.clone());
                }
                RowOpKind::Patch(patches) => {
                    let base = table
                        .get(&op.id)
                        .ok_or_else(|| StoreError::RowNotFound(op.id.to_string()))?;
                    let patched = apply_patches(base, patches);
                    table.insert(op.id.clone(), patched);
                }
                RowOpKind::Replace(record) => {
                    table.insert(op.id.clone(), record.clone());
                }
                RowOpKind::Delete => {
                    table.remove(&op.id);
                }
            }

            staged_log.push(AppliedRow {
                id: op.id.clone(),
                class: op.class,
                op: op.kind_name(),
            });
        }

        *nodes = staged_nodes;
        *edges = staged_edges;
        self.log.write().extend(staged_log);
        Ok(())
    }

    fn count_nodes(&self) -> StoreResult<u64> {
        Ok(self.nodes.read().len() as u64)
    }

    fn count_edges(&self) -> StoreResult<u64> {
        Ok(self.edges.read().len() as u64)
    }

    fn root_nodes(&self, limit: usize) -> StoreResult<Vec<EntityRow>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|(_, record)| Self::is_root(record))
            .take(limit)
            .map(|(id, record)| EntityRow::new(id.clone(), record.clone()))
            .collect())
    }

    fn recent_nodes(&self, limit: usize) -> StoreResult<Vec<EntityRow>> {
        let nodes = self.nodes.read();
        let mut rows: Vec<(&EntityId, &Record)> = nodes
            .iter()
            .filter(|(_, record)| !Self::is_root(record))
            .collect();
        rows.sort_by_key(|(_, record)| std::cmp::Reverse(Self::updated_at(record)));

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(id, record)| EntityRow::new(id.clone(), record.clone()))
            .collect())
    }

    fn child_nodes(&self, parents: &[EntityId], limit: usize) -> StoreResult<Vec<EntityRow>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|(_, record)| {
                record
                    .get("parent")
                    .and_then(|v| v.as_str())
                    .map(|parent| parents.iter().any(|p| p.as_str() == parent))
                    .unwrap_or(false)
            })
            .take(limit)
            .map(|(id, record)| EntityRow::new(id.clone(), record.clone()))
            .collect())
    }

    fn all_nodes(&self) -> StoreResult<Vec<EntityRow>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .map(|(id, record)| EntityRow::new(id.clone(), record.clone()))
            .collect())
    }

    fn all_edges(&self) -> StoreResult<Vec<EntityRow>> {
        Ok(self
            .edges
            .read()
            .iter()
            .map(|(id, record)| EntityRow::new(id.clone(), record.clone()))
            .collect())
    }

    fn get_node(&self, id: &EntityId) -> StoreResult<Option<Record>> {
        Ok(self.nodes.read().get(id).cloned())
    }

    fn get_edge(&self, id: &EntityId) -> StoreResult<Option<Record>> {
        Ok(self.edges.read().get(id).cloned())
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

    fn insert(id: &str, class: EntityClass, data: serde_json::Value) -> RowOp {
        RowOp {
            id: id.into(),
            class,
            kind: RowOpKind::Insert(record(data)),
        }
    }

    #[test]
    fn apply_inserts_and_reads_back() {
        let store = MemoryPrimaryStore::new();
        store
            .apply(&[insert("n1", EntityClass::Node, json!({"name": "x"}))])
            .unwrap();

        assert_eq!(store.count_nodes().unwrap(), 1);
        assert_eq!(store.node(&"n1".into()).unwrap()["name"], json!("x"));
    }

    #[test]
    fn duplicate_insert_fails_whole_transaction() {
        let store = MemoryPrimaryStore::new();
        store
            .apply(&[insert("n1", EntityClass::Node, json!({}))])
            .unwrap();

        let result = store.apply(&[
            insert("n2", EntityClass::Node, json!({})),
            insert("n1", EntityClass::Node, json!({})),
        ]);

        assert!(matches!(result, Err(StoreError::Constraint(_))));
        // n2 must have been rolled back with the failing transaction.
        assert!(store.node(&"n2".into()).is_none());
        assert_eq!(store.count_nodes().unwrap(), 1);
    }

    #[test]
    fn patch_on_missing_row_rolls_back() {
        let store = MemoryPrimaryStore::new();
        let result = store.apply(&[
            insert("n1", EntityClass::Node, json!({})),
            RowOp {
                id: "ghost".into(),
                class: EntityClass::Node,
                kind: RowOpKind::Patch(vec![]),
            },
        ]);

        assert!(matches!(result, Err(StoreError::RowNotFound(_))));
        assert_eq!(store.count_nodes().unwrap(), 0);
    }

    #[test]
    fn delete_missing_row_is_noop() {
        let store = MemoryPrimaryStore::new();
        store
            .apply(&[RowOp {
                id: "ghost".into(),
                class: EntityClass::Node,
                kind: RowOpKind::Delete,
            }])
            .unwrap();
        assert_eq!(store.count_nodes().unwrap(), 0);
    }

    #[test]
    fn failure_injection_counts_down() {
        let store = MemoryPrimaryStore::new();
        store.fail_next_applies(2);

        assert!(store.apply(&[]).is_err());
        assert!(store.apply(&[]).is_err());
        assert!(store.apply(&[]).is_ok());
        assert_eq!(store.apply_calls(), 3);
    }

    #[test]
    fn roots_and_recents_partition_nodes() {
        let store = MemoryPrimaryStore::new();
        store.seed_node("root", record(json!({"name": "r"})));
        store.seed_node("a", record(json!({"parent": "root", "updated_at": 5})));
        store.seed_node("b", record(json!({"parent": "root", "updated_at": 9})));

        let roots = store.root_nodes(10).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id.as_str(), "root");

        let recents = store.recent_nodes(10).unwrap();
        assert_eq!(recents.len(), 2);
        assert_eq!(recents[0].id.as_str(), "b");
        assert_eq!(recents[1].id.as_str(), "a");
    }

    #[test]
    fn child_lookup_respects_parents_and_limit() {
        let store = MemoryPrimaryStore::new();
        store.seed_node("root", record(json!({})));
        store.seed_node("a", record(json!({"parent": "root"})));
        store.seed_node("b", record(json!({"parent": "root"})));
        store.seed_node("c", record(json!({"parent": "other"})));

        let children = store.child_nodes(&["root".into()], 10).unwrap();
        assert_eq!(children.len(), 2);

        let limited = store.child_nodes(&["root".into()], 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn applied_log_preserves_commit_order() {
        let store = MemoryPrimaryStore::new();
        store
            .apply(&[
                insert("n1", EntityClass::Node, json!({})),
                insert("e1", EntityClass::Edge, json!({"source": "n1", "target": "n1"})),
            ])
            .unwrap();

        let log = store.applied_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].class, EntityClass::Node);
        assert_eq!(log[1].class, EntityClass::Edge);
    }
}
