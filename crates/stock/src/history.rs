//! Typed movement history for a single variant.

use gemstock_events::{EventEnvelope, Projection};

use crate::movement::MovementRecord;
use crate::variant::VariantEvent;

/// Movement history view for one variant's audit screen.
///
/// A typed projection over the variant's own stream: collects every
/// [`MovementRecord`] in order and tracks the folded quantity. Drive it with a
/// `ProjectionRunner` pinned to the variant's stream, which enforces stream
/// identity and monotonic sequencing.
#[derive(Debug, Default, Clone)]
pub struct MovementHistory {
    records: Vec<MovementRecord>,
}

impl MovementHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All movements, oldest first.
    pub fn records(&self) -> &[MovementRecord] {
        &self.records
    }

    /// Quantity after the latest movement (0 before any movement).
    pub fn current_quantity(&self) -> i64 {
        self.records.last().map(|r| r.quantity_after).unwrap_or(0)
    }

    /// Whether every movement's `quantity_before` equals the previous
    /// movement's `quantity_after`.
    pub fn is_chained(&self) -> bool {
        self.records
            .windows(2)
            .all(|w| w[1].quantity_before == w[0].quantity_after)
    }
}

impl Projection for MovementHistory {
    type Ev = VariantEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        if let VariantEvent::StockMoved(moved) = envelope.payload() {
            self.records.push(moved.record.clone());
        }
    }
}
