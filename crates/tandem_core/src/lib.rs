//! # tandem core
//!
//! Delta model and coalescing rules for the tandem dual-store
//! synchronization engine.
//!
//! This crate provides:
//! - Entity identifiers and entity classes (node vs. edge)
//! - Opaque JSON record payloads and ordered field patches
//! - The [`Delta`] type and its coalescing algebra
//! - Immutable engine configuration snapshots
//! - Atomic telemetry counters
//!
//! ## Key Invariants
//!
//! - At most one pending delta exists per entity id; new mutations merge
//!   into it via [`Delta::coalesce`], never as a second entry
//! - Insert followed by Delete cancels entirely (the entity never reached
//!   a store)
//! - Patch replay is deterministic and ordered: later patches win

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod delta;
mod error;
mod patch;
mod telemetry;
mod types;

pub use config::{SyncConfig, SyncConfigOverrides};
pub use delta::{Coalesced, Delta, DeltaOp};
pub use error::{CoreError, CoreResult};
pub use patch::{apply_patches, FieldPatch, PatchOp, Record};
pub use telemetry::{EngineTelemetry, TelemetrySnapshot};
pub use types::{edge_endpoints, EntityClass, EntityId};
