//! Read-model projections built from published event envelopes.
//!
//! Every projection here follows the same shape: a per-stream sequence cursor
//! for idempotent at-least-once consumption, a disposable backing store, and a
//! `rebuild_from_scratch` that replays history deterministically.

mod dashboard;
mod movement_log;
mod products;
mod stock_levels;

pub use dashboard::{DashboardProjection, DashboardSummary};
pub use movement_log::{MovementLogEntry, MovementLogProjection};
pub use products::{ProductListProjection, ProductRow};
pub use stock_levels::{StockLevelRow, StockLevelsProjection};

use std::collections::HashMap;
use std::sync::RwLock;

use gemstock_core::AggregateId;

/// Per-stream cursor map shared by the projections.
///
/// `check_and_advance` returns `Ok(false)` for duplicates (replays at or below
/// the cursor), `Ok(true)` when the sequence is the expected next one, and an
/// error for gaps.
#[derive(Debug, Default)]
pub(crate) struct CursorMap {
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionApplyError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("event aggregate does not match envelope stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

impl CursorMap {
    pub(crate) fn check_and_advance(
        &self,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<bool, ProjectionApplyError> {
        let mut cursors = match self.cursors.write() {
            Ok(c) => c,
            Err(_) => return Ok(false),
        };

        let last = *cursors.get(&aggregate_id).unwrap_or(&0);

        if seq == 0 {
            return Err(ProjectionApplyError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            // The first event may carry any positive sequence; after that the
            // stream must increment strictly by one.
            return Err(ProjectionApplyError::NonMonotonicSequence { last, found: seq });
        }

        cursors.insert(aggregate_id, seq);
        Ok(true)
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
    }
}
