//! # tandem engine
//!
//! Delta-based dual-store synchronization engine.
//!
//! This crate provides:
//! - Mutation tracking with per-entity coalescing ([`DeltaCollector`])
//! - Bounded-latency batching (resettable debounce + non-resettable
//!   max-wait timers, size threshold)
//! - Atomic primary-store transactions with retry and exponential backoff
//!   ([`TransactionWriter`])
//! - Best-effort streaming propagation to the secondary graph store
//!   ([`GraphSync`])
//! - Progressive startup hydration ([`Hydrator`])
//! - An observable status register ([`SyncStateHandle`])
//! - The [`SyncEngine`] orchestrator composing all of the above
//!
//! ## Architecture
//!
//! Tracking calls are synchronous and never block on I/O. A background
//! driver task watches the collector's timers and drains batches through
//! the writer; on success the batch streams to the graph store. Hydration
//! runs independently at startup and feeds the same status register.
//!
//! ## Key Invariants
//!
//! - At most one pending delta per entity id (coalescing)
//! - Node operations precede edge operations in every transaction
//! - The primary write path is mutually exclusive; the secondary path is
//!   idempotent and unguarded
//! - A failed batch is re-queued in full: at-least-once delivery to the
//!   primary store
//! - The secondary store may lag; its failures never affect the primary
//!   commit

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collector;
mod engine;
mod graph_sync;
mod hydration;
mod status;
mod writer;

pub use collector::{DeltaCollector, RecordOutcome};
pub use engine::{DirtyOperation, SyncEngine};
pub use graph_sync::GraphSync;
pub use hydration::{HydratedGraph, Hydrator};
pub use status::{
    HydrationPhase, HydrationProgress, Subscription, SyncStateHandle, SyncStatus,
};
pub use writer::{TransactionResult, TransactionWriter};

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine's awaited operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tandem_store::StoreError),

    /// A payload was malformed.
    #[error("core error: {0}")]
    Core(#[from] tandem_core::CoreError),

    /// Hydration aborted during the named phase.
    #[error("hydration failed during {phase} phase: {source}")]
    HydrationFailed {
        /// The phase that was running when the store failed.
        phase: HydrationPhase,
        /// The underlying store error.
        source: tandem_store::StoreError,
    },

    /// The engine is shutting down and no longer accepts work.
    #[error("engine is shutting down")]
    ShuttingDown,
}
