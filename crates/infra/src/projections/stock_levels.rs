use serde_json::Value as JsonValue;

use gemstock_catalog::ProductId;
use gemstock_events::EventEnvelope;
use gemstock_stock::{StockStatus, VariantEvent, VariantId, derive_status};

use crate::read_model::ReadModelStore;

use super::{CursorMap, ProjectionApplyError};

/// Queryable stock read model: current level per variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevelRow {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub quantity_on_hand: i64,
    pub reorder_level: i64,
    pub status: StockStatus,
    pub discontinued: bool,
    pub active: bool,
}

/// Stock levels projection.
///
/// Consumes published envelopes (JSON payloads) and maintains one row per
/// variant. Disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: ReadModelStore<VariantId, StockLevelRow>,
{
    store: S,
    cursors: CursorMap,
}

impl<S> StockLevelsProjection<S>
where
    S: ReadModelStore<VariantId, StockLevelRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: CursorMap::default(),
        }
    }

    pub fn get(&self, variant_id: &VariantId) -> Option<StockLevelRow> {
        self.store.get(variant_id)
    }

    pub fn list(&self) -> Vec<StockLevelRow> {
        self.store.list()
    }

    /// Apply a published envelope into the projection.
    ///
    /// Idempotent for at-least-once delivery; envelopes for other aggregate
    /// types are ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        if envelope.aggregate_type() != "stock.variant" {
            return Ok(());
        }

        let event: VariantEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        let variant_id = event_variant_id(&event);
        if variant_id.0 != envelope.aggregate_id() {
            return Err(ProjectionApplyError::StreamMismatch(
                "event variant_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if !self
            .cursors
            .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        self.apply_event(variant_id, &event);
        Ok(())
    }

    fn apply_event(&self, variant_id: VariantId, event: &VariantEvent) {
        match event {
            VariantEvent::VariantCreated(e) => {
                self.store.upsert(
                    variant_id,
                    StockLevelRow {
                        variant_id,
                        product_id: e.product_id,
                        sku: e.sku.clone(),
                        quantity_on_hand: 0,
                        reorder_level: e.reorder_level,
                        status: derive_status(0, e.reorder_level),
                        discontinued: false,
                        active: true,
                    },
                );
            }
            VariantEvent::StockMoved(e) => {
                self.update(variant_id, |row| {
                    row.quantity_on_hand = e.record.quantity_after;
                });
            }
            VariantEvent::ReorderLevelSet(e) => {
                let level = e.reorder_level;
                self.update(variant_id, move |row| {
                    row.reorder_level = level;
                });
            }
            VariantEvent::VariantDiscontinued(_) => {
                self.update(variant_id, |row| {
                    row.discontinued = true;
                });
            }
            VariantEvent::VariantReinstated(_) => {
                self.update(variant_id, |row| {
                    row.discontinued = false;
                });
            }
            VariantEvent::VariantDeactivated(_) => {
                self.update(variant_id, |row| {
                    row.active = false;
                });
            }
            VariantEvent::VariantReactivated(_) => {
                self.update(variant_id, |row| {
                    row.active = true;
                });
            }
        }
    }

    fn update(&self, variant_id: VariantId, f: impl FnOnce(&mut StockLevelRow)) {
        if let Some(mut row) = self.store.get(&variant_id) {
            f(&mut row);
            row.status = if row.discontinued {
                StockStatus::Discontinued
            } else {
                derive_status(row.quantity_on_hand, row.reorder_level)
            };
            self.store.upsert(variant_id, row);
        }
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        self.cursors.clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        // Deterministic replay order: aggregate, then sequence.
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

fn event_variant_id(event: &VariantEvent) -> VariantId {
    match event {
        VariantEvent::VariantCreated(e) => e.variant_id,
        VariantEvent::StockMoved(e) => e.record.variant_id,
        VariantEvent::ReorderLevelSet(e) => e.variant_id,
        VariantEvent::VariantDiscontinued(e) => e.variant_id,
        VariantEvent::VariantReinstated(e) => e.variant_id,
        VariantEvent::VariantDeactivated(e) => e.variant_id,
        VariantEvent::VariantReactivated(e) => e.variant_id,
    }
}
