//! Primary store boundary.

use crate::error::StoreResult;
use tandem_core::{EntityClass, EntityId, FieldPatch, Record};

/// A single typed row operation inside a primary-store transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOp {
    /// The target row id.
    pub id: EntityId,
    /// Which table the row lives in.
    pub class: EntityClass,
    /// What to do to the row.
    pub kind: RowOpKind,
}

/// The kind of change a [`RowOp`] applies.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOpKind {
    /// Insert a new row. Fails the transaction if the id already exists.
    Insert(Record),
    /// Apply a field-level patch list to an existing row.
    Patch(Vec<FieldPatch>),
    /// Write the full row, inserting or overwriting.
    Replace(Record),
    /// Delete the row. Deleting a missing row is a no-op.
    Delete,
}

impl RowOp {
    /// Short operation name for logging and transaction logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RowOpKind::Insert(_) => "insert",
            RowOpKind::Patch(_) => "patch",
            RowOpKind::Replace(_) => "replace",
            RowOpKind::Delete => "delete",
        }
    }
}

/// A row loaded from the primary store.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// The row id.
    pub id: EntityId,
    /// The row payload.
    pub record: Record,
}

impl EntityRow {
    /// Creates a row.
    #[must_use]
    pub fn new(id: EntityId, record: Record) -> Self {
        Self { id, record }
    }
}

/// The authoritative, transactional store.
///
/// The primary store owns durability of every committed mutation. It spans
/// two tables - nodes and edges - and interprets its own schema: which rows
/// are roots, which node contains which children, and recency ordering.
/// The engine only routes ids and never inspects rows beyond edge
/// endpoints.
///
/// # Invariants
///
/// - [`PrimaryStore::apply`] is atomic: either every operation in the slice
///   is applied, or none is (rollback on any statement failure)
/// - Query methods are read-only and may run concurrently with `apply`
/// - Implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`crate::MemoryPrimaryStore`] - in-memory reference store for tests
pub trait PrimaryStore: Send + Sync {
    /// Applies one atomic, multi-statement transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; no partial state is ever
    /// visible afterwards.
    fn apply(&self, ops: &[RowOp]) -> StoreResult<()>;

    /// Returns the total number of node rows.
    fn count_nodes(&self) -> StoreResult<u64>;

    /// Returns the total number of edge rows.
    fn count_edges(&self) -> StoreResult<u64>;

    /// Returns up to `limit` root-level node rows.
    fn root_nodes(&self, limit: usize) -> StoreResult<Vec<EntityRow>>;

    /// Returns up to `limit` non-root node rows, most recently updated
    /// first.
    fn recent_nodes(&self, limit: usize) -> StoreResult<Vec<EntityRow>>;

    /// Returns up to `limit` node rows whose parent is one of `parents`.
    ///
    /// Containment is the store's own notion; a node with no children under
    /// any of `parents` simply contributes nothing.
    fn child_nodes(&self, parents: &[EntityId], limit: usize) -> StoreResult<Vec<EntityRow>>;

    /// Returns every node row.
    fn all_nodes(&self) -> StoreResult<Vec<EntityRow>>;

    /// Returns every edge row.
    fn all_edges(&self) -> StoreResult<Vec<EntityRow>>;

    /// Reads a single node row.
    fn get_node(&self, id: &EntityId) -> StoreResult<Option<Record>>;

    /// Reads a single edge row.
    fn get_edge(&self, id: &EntityId) -> StoreResult<Option<Record>>;
}
