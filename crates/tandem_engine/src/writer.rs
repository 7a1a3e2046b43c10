//! Atomic primary-store transactions with retry.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tandem_core::{edge_endpoints, Delta, DeltaOp, EntityClass, SyncConfig};
use tandem_store::{PrimaryStore, RowOp, RowOpKind};
use tracing::{debug, error, warn};

/// The outcome of one attempted batch transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionResult {
    /// Whether the transaction ultimately committed.
    pub success: bool,
    /// Node rows inserted.
    pub inserted_nodes: usize,
    /// Node rows patched or replaced.
    pub updated_nodes: usize,
    /// Node rows deleted.
    pub deleted_nodes: usize,
    /// Edge rows inserted.
    pub inserted_edges: usize,
    /// Edge rows patched or replaced.
    pub updated_edges: usize,
    /// Edge rows deleted.
    pub deleted_edges: usize,
    /// Problems encountered: skipped malformed rows, and the store error
    /// chain when the transaction failed.
    pub errors: Vec<String>,
    /// Wall-clock time spent, retries included.
    pub duration: Duration,
}

impl TransactionResult {
    /// Total rows the transaction touched.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.inserted_nodes
            + self.updated_nodes
            + self.deleted_nodes
            + self.inserted_edges
            + self.updated_edges
            + self.deleted_edges
    }
}

/// Converts delta batches into atomic primary-store transactions.
///
/// Ordering inside a transaction: all node operations precede all edge
/// operations, and within each class deletes precede inserts and updates
/// (deleting first frees uniqueness constraints before re-insertion).
/// The whole batch commits or nothing does; on transient failure the whole
/// batch is retried with exponential backoff.
#[derive(Debug)]
pub struct TransactionWriter<P> {
    store: Arc<P>,
}

impl<P: PrimaryStore> TransactionWriter<P> {
    /// Creates a writer over the given primary store.
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    /// Executes one batch as a single atomic transaction.
    ///
    /// Never returns an error: failure after exhausting retries is reported
    /// as `success: false` and the caller owns re-queuing the batch.
    pub async fn execute(&self, deltas: &[Delta], config: &SyncConfig) -> TransactionResult {
        let start = Instant::now();
        let mut result = TransactionResult::default();
        let plan = build_plan(deltas, &mut result);

        if plan.is_empty() {
            result.success = true;
            result.duration = start.elapsed();
            return result;
        }

        let mut attempt: u32 = 0;
        loop {
            match self.store.apply(&plan) {
                Ok(()) => {
                    result.success = true;
                    result.duration = start.elapsed();
                    debug!(
                        rows = plan.len(),
                        attempt,
                        elapsed_ms = result.duration.as_millis() as u64,
                        "batch committed"
                    );
                    return result;
                }
                Err(err) if err.is_retryable() && attempt < config.retry_attempts => {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "transaction failed, retrying"
                    );
                    result.errors.push(err.to_string());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempt, %err, "transaction failed, giving up");
                    result.errors.push(err.to_string());
                    result = TransactionResult {
                        success: false,
                        errors: result.errors,
                        duration: start.elapsed(),
                        ..TransactionResult::default()
                    };
                    return result;
                }
            }
        }
    }
}

/// Flattens a delta batch into an ordered row-operation plan.
///
/// Counters in `result` reflect the rows the plan will touch; malformed
/// edge rows are skipped and noted.
fn build_plan(deltas: &[Delta], result: &mut TransactionResult) -> Vec<RowOp> {
    let mut plan = Vec::with_capacity(deltas.len());

    for class in [EntityClass::Node, EntityClass::Edge] {
        // Deletes first within each class.
        for delta in deltas.iter().filter(|d| d.class == class) {
            if matches!(delta.op, DeltaOp::Delete) {
                plan.push(RowOp {
                    id: delta.id.clone(),
                    class,
                    kind: RowOpKind::Delete,
                });
                match class {
                    EntityClass::Node => result.deleted_nodes += 1,
                    EntityClass::Edge => result.deleted_edges += 1,
                }
            }
        }

        for delta in deltas.iter().filter(|d| d.class == class) {
            let kind = match &delta.op {
                DeltaOp::Delete => continue,
                DeltaOp::Insert(data) => {
                    if class.is_edge() && !validate_edge(delta, data, result) {
                        continue;
                    }
                    RowOpKind::Insert(data.clone())
                }
                DeltaOp::Replace(data) => {
                    if class.is_edge() && !validate_edge(delta, data, result) {
                        continue;
                    }
                    RowOpKind::Replace(data.clone())
                }
                DeltaOp::Update(patches) => RowOpKind::Patch(patches.clone()),
            };

            match (class, &kind) {
                (EntityClass::Node, RowOpKind::Insert(_)) => result.inserted_nodes += 1,
                (EntityClass::Node, _) => result.updated_nodes += 1,
                (EntityClass::Edge, RowOpKind::Insert(_)) => result.inserted_edges += 1,
                (EntityClass::Edge, _) => result.updated_edges += 1,
            }

            plan.push(RowOp {
                id: delta.id.clone(),
                class,
                kind,
            });
        }
    }

    plan
}

fn validate_edge(
    delta: &Delta,
    data: &tandem_core::Record,
    result: &mut TransactionResult,
) -> bool {
    match edge_endpoints(&delta.id, data) {
        Ok(_) => true,
        Err(err) => {
            warn!(entity = %delta.id, %err, "skipping malformed edge row");
            result.errors.push(err.to_string());
            false
        }
    }
}
