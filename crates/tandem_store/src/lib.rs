//! # tandem store
//!
//! Store boundary for the tandem sync engine.
//!
//! This crate provides:
//! - [`PrimaryStore`]: the authoritative, transactional store boundary
//! - [`GraphStore`]: the derived, query-optimized secondary store boundary
//! - Typed row operations ([`RowOp`]) for atomic primary transactions
//! - Statement rendering with string escaping for query-language-backed
//!   graph stores
//! - In-memory reference implementations with failure injection for tests
//!
//! Both stores are external collaborators: the engine reaches them only
//! through these traits and never interprets their schemas.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod graph;
mod memory;
mod memory_graph;
mod primary;
pub mod statement;

pub use error::{StoreError, StoreResult};
pub use graph::{GraphEdgeUpsert, GraphNodeUpsert, GraphStore};
pub use memory::{AppliedRow, MemoryPrimaryStore};
pub use memory_graph::{MemoryGraphStore, StoredEdge};
pub use primary::{EntityRow, PrimaryStore, RowOp, RowOpKind};
