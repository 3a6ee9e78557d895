use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use gemstock_events::EventEnvelope;
use gemstock_stock::{Actor, MovementType, VariantEvent, VariantId};

use super::{CursorMap, ProjectionApplyError};

/// One row in the movement history screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementLogEntry {
    pub event_id: Uuid,
    pub variant_id: VariantId,
    pub sequence_number: u64,
    pub movement_type: MovementType,
    pub quantity_before: i64,
    pub quantity_delta: i64,
    pub quantity_after: i64,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Movement log projection: a flat, append-only view of every stock movement.
///
/// On apply it also verifies the ledger chains: each movement's
/// `quantity_before` must equal the previous movement's `quantity_after` for
/// that variant. A mismatch means corrupted history and is surfaced instead of
/// silently recorded.
#[derive(Debug, Default)]
pub struct MovementLogProjection {
    entries: RwLock<Vec<MovementLogEntry>>,
    last_after: RwLock<HashMap<VariantId, i64>>,
    cursors: CursorMap,
}

impl MovementLogProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// All movements, oldest first.
    pub fn entries(&self) -> Vec<MovementLogEntry> {
        match self.entries.read() {
            Ok(e) => e.clone(),
            Err(_) => vec![],
        }
    }

    /// Movements for one variant, oldest first.
    pub fn entries_for(&self, variant_id: VariantId) -> Vec<MovementLogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.variant_id == variant_id)
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        if envelope.aggregate_type() != "stock.variant" {
            return Ok(());
        }

        let event: VariantEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let VariantEvent::StockMoved(moved) = event else {
            // Still advance the cursor so later movements see the right sequence.
            self.cursors
                .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?;
            return Ok(());
        };

        let record = &moved.record;
        if record.variant_id.0 != envelope.aggregate_id() {
            return Err(ProjectionApplyError::StreamMismatch(
                "movement variant_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        // Ledger chaining check.
        if let Ok(mut last) = self.last_after.write() {
            if let Some(&prev_after) = last.get(&record.variant_id) {
                if record.quantity_before != prev_after {
                    return Err(ProjectionApplyError::StreamMismatch(format!(
                        "movement does not chain: quantity_before={} but previous quantity_after={}",
                        record.quantity_before, prev_after
                    )));
                }
            }
            last.insert(record.variant_id, record.quantity_after);
        }

        if let Ok(mut entries) = self.entries.write() {
            entries.push(MovementLogEntry {
                event_id: envelope.event_id(),
                variant_id: record.variant_id,
                sequence_number: envelope.sequence_number(),
                movement_type: record.movement_type,
                quantity_before: record.quantity_before,
                quantity_delta: record.quantity_delta,
                quantity_after: record.quantity_after,
                reason: record.reason.clone(),
                actor: record.actor,
                occurred_at: record.occurred_at,
            });
        }

        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        self.cursors.clear();
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        if let Ok(mut last) = self.last_after.write() {
            last.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemstock_core::AggregateId;
    use gemstock_stock::variant::StockMoved;
    use gemstock_stock::{Actor, MovementRecord};

    fn moved_envelope(
        variant_id: VariantId,
        seq: u64,
        before: i64,
        delta: i64,
    ) -> EventEnvelope<JsonValue> {
        let event = VariantEvent::StockMoved(StockMoved {
            record: MovementRecord::new(
                variant_id,
                MovementType::Adjustment,
                before,
                delta,
                "test",
                Actor::system(),
                Utc::now(),
            )
            .unwrap(),
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            variant_id.0,
            "stock.variant",
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn records_movements_in_order() {
        let log = MovementLogProjection::new();
        let id = VariantId::new(AggregateId::new());

        log.apply_envelope(&moved_envelope(id, 1, 0, 10)).unwrap();
        log.apply_envelope(&moved_envelope(id, 2, 10, -4)).unwrap();

        let entries = log.entries_for(id);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].quantity_after, 10);
        assert_eq!(entries[1].quantity_before, 10);
        assert_eq!(entries[1].quantity_after, 6);
    }

    #[test]
    fn broken_chain_is_rejected() {
        let log = MovementLogProjection::new();
        let id = VariantId::new(AggregateId::new());

        log.apply_envelope(&moved_envelope(id, 1, 0, 10)).unwrap();
        // quantity_before should be 10, not 7.
        let err = log.apply_envelope(&moved_envelope(id, 2, 7, 1)).unwrap_err();
        assert!(matches!(err, ProjectionApplyError::StreamMismatch(_)));
    }

    #[test]
    fn replays_are_idempotent() {
        let log = MovementLogProjection::new();
        let id = VariantId::new(AggregateId::new());

        let env = moved_envelope(id, 1, 0, 10);
        log.apply_envelope(&env).unwrap();
        log.apply_envelope(&env).unwrap();

        assert_eq!(log.entries_for(id).len(), 1);
    }

    #[test]
    fn variants_chain_independently() {
        let log = MovementLogProjection::new();
        let a = VariantId::new(AggregateId::new());
        let b = VariantId::new(AggregateId::new());

        log.apply_envelope(&moved_envelope(a, 1, 0, 10)).unwrap();
        log.apply_envelope(&moved_envelope(b, 1, 0, 3)).unwrap();
        log.apply_envelope(&moved_envelope(a, 2, 10, -5)).unwrap();

        assert_eq!(log.entries_for(a).len(), 2);
        assert_eq!(log.entries_for(b).len(), 1);
    }
}
