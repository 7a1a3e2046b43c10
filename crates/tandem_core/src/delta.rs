//! Deltas: tracked mutation intents and their coalescing algebra.

use crate::patch::{apply_patches, FieldPatch, Record};
use crate::types::{EntityClass, EntityId};
use std::time::SystemTime;

/// The net operation a delta will perform against the primary store.
///
/// This is the single canonical representation of a mutation; the legacy
/// operation-enum tracking surface adapts into it at the engine boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaOp {
    /// Insert a brand-new row with the given payload.
    Insert(Record),
    /// Apply an ordered field-level patch list to the existing row.
    Update(Vec<FieldPatch>),
    /// Replace the existing row wholesale with the given payload.
    Replace(Record),
    /// Delete the row.
    Delete,
}

impl DeltaOp {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Insert(_) => "insert",
            DeltaOp::Update(_) => "update",
            DeltaOp::Replace(_) => "replace",
            DeltaOp::Delete => "delete",
        }
    }

    /// Returns true for operations that carry a full payload.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        matches!(self, DeltaOp::Insert(_) | DeltaOp::Replace(_))
    }
}

/// A single tracked mutation intent for one entity, already coalesced with
/// any prior pending mutation for that entity.
///
/// # Lifecycle
///
/// Created by a tracking call, lives in the collector's pending map,
/// coalesced by further calls, atomically removed as part of a batch when a
/// flush fires, and re-inserted verbatim if the resulting transaction
/// ultimately fails after exhausting retries.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// The entity this delta targets.
    pub id: EntityId,
    /// Node or edge.
    pub class: EntityClass,
    /// The net operation.
    pub op: DeltaOp,
    /// Per-entity monotonic counter, bumped on every coalesce. Usable as a
    /// logical clock.
    pub version: u64,
    /// When this delta was created or last coalesced.
    pub tracked_at: SystemTime,
}

/// Outcome of coalescing an incoming operation into a pending delta.
#[derive(Debug, Clone, PartialEq)]
pub enum Coalesced {
    /// The merged delta replaces the pending entry.
    Merged(Delta),
    /// The pending entry is removed entirely (insert cancelled by delete).
    Cancelled,
    /// The incoming operation is a stale echo against a pending delete and
    /// was dropped; the pending delta is kept unchanged.
    Dropped(Delta),
}

impl Delta {
    /// Creates a fresh delta for an entity with no pending entry.
    #[must_use]
    pub fn new(id: EntityId, class: EntityClass, op: DeltaOp) -> Self {
        Self {
            id,
            class,
            op,
            version: 1,
            tracked_at: SystemTime::now(),
        }
    }

    /// Merges an incoming operation into this pending delta.
    ///
    /// The rules reduce any sequence of operations on one entity to a
    /// single net operation:
    ///
    /// | pending   | incoming  | result                         |
    /// |-----------|-----------|--------------------------------|
    /// | Insert    | Update    | Insert with patches applied    |
    /// | Insert    | Replace   | Insert with the new payload    |
    /// | Insert    | Delete    | cancelled (never hit a store)  |
    /// | Update    | Update    | Update with both patch lists   |
    /// | Update    | Replace   | Replace                        |
    /// | Update    | Delete    | Delete                         |
    /// | Replace   | Update    | Replace with patches applied   |
    /// | Replace   | Replace   | Replace with the new payload   |
    /// | Replace   | Delete    | Delete                         |
    /// | Delete    | Insert    | Replace (row may still exist)  |
    /// | Delete    | Update    | dropped stale echo             |
    /// | Delete    | Replace   | dropped stale echo             |
    /// | Delete    | Delete    | Delete                         |
    #[must_use]
    pub fn coalesce(self, incoming: DeltaOp) -> Coalesced {
        let version = self.version + 1;
        let merged = |op: DeltaOp| {
            Coalesced::Merged(Delta {
                id: self.id.clone(),
                class: self.class,
                op,
                version,
                tracked_at: SystemTime::now(),
            })
        };

        match (&self.op, incoming) {
            (DeltaOp::Insert(data), DeltaOp::Update(patches)) => {
                merged(DeltaOp::Insert(apply_patches(data, &patches)))
            }
            (DeltaOp::Insert(_), DeltaOp::Replace(data)) => merged(DeltaOp::Insert(data)),
            (DeltaOp::Insert(_), DeltaOp::Delete) => Coalesced::Cancelled,
            (DeltaOp::Insert(_), DeltaOp::Insert(data)) => merged(DeltaOp::Insert(data)),

            (DeltaOp::Update(first), DeltaOp::Update(mut second)) => {
                let mut patches = first.clone();
                patches.append(&mut second);
                merged(DeltaOp::Update(patches))
            }
            (DeltaOp::Update(_), DeltaOp::Replace(data)) => merged(DeltaOp::Replace(data)),
            (DeltaOp::Update(_), DeltaOp::Delete) => merged(DeltaOp::Delete),
            (DeltaOp::Update(_), DeltaOp::Insert(data)) => merged(DeltaOp::Replace(data)),

            (DeltaOp::Replace(data), DeltaOp::Update(patches)) => {
                merged(DeltaOp::Replace(apply_patches(data, &patches)))
            }
            (DeltaOp::Replace(_), DeltaOp::Replace(data)) => merged(DeltaOp::Replace(data)),
            (DeltaOp::Replace(_), DeltaOp::Delete) => merged(DeltaOp::Delete),
            (DeltaOp::Replace(_), DeltaOp::Insert(data)) => merged(DeltaOp::Replace(data)),

            // A delete followed by an insert must overwrite whatever row
            // may still exist in the store: the delete might have committed
            // in an earlier batch, or might never commit at all.
            (DeltaOp::Delete, DeltaOp::Insert(data)) => merged(DeltaOp::Replace(data)),
            (DeltaOp::Delete, DeltaOp::Delete) => merged(DeltaOp::Delete),
            (DeltaOp::Delete, DeltaOp::Update(_) | DeltaOp::Replace(_)) => {
                Coalesced::Dropped(Delta {
                    id: self.id.clone(),
                    class: self.class,
                    op: DeltaOp::Delete,
                    version: self.version,
                    tracked_at: self.tracked_at,
                })
            }
        }
    }
}
