use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;

use gemstock_events::EventEnvelope;
use gemstock_stock::{StockStatus, VariantEvent, VariantId, derive_status};

use super::{CursorMap, ProjectionApplyError};

/// Aggregated numbers for the back-office landing screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_variants: usize,
    pub in_stock: usize,
    pub low_stock: usize,
    pub out_of_stock: usize,
    pub discontinued: usize,
    pub total_units_on_hand: i64,
    /// SKUs currently at or below their reorder level, for the reorder list.
    pub low_stock_skus: Vec<String>,
}

#[derive(Debug, Clone)]
struct VariantSnapshot {
    sku: String,
    quantity: i64,
    reorder_level: i64,
    discontinued: bool,
    active: bool,
}

impl VariantSnapshot {
    fn status(&self) -> StockStatus {
        if self.discontinued {
            StockStatus::Discontinued
        } else {
            derive_status(self.quantity, self.reorder_level)
        }
    }
}

/// Dashboard projection: status counts and the low-stock list.
///
/// Keeps a minimal per-variant snapshot and recomputes the summary on read,
/// which keeps apply trivially idempotent-safe.
#[derive(Debug, Default)]
pub struct DashboardProjection {
    variants: RwLock<HashMap<VariantId, VariantSnapshot>>,
    cursors: CursorMap,
}

impl DashboardProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> DashboardSummary {
        let variants = match self.variants.read() {
            Ok(v) => v,
            Err(_) => return DashboardSummary::default(),
        };

        let mut summary = DashboardSummary::default();

        // Deactivated variants keep their history but leave the dashboard.
        let mut low: Vec<String> = Vec::new();
        for snapshot in variants.values().filter(|s| s.active) {
            summary.total_variants += 1;
            summary.total_units_on_hand += snapshot.quantity;
            match snapshot.status() {
                StockStatus::InStock => summary.in_stock += 1,
                StockStatus::LowStock => {
                    summary.low_stock += 1;
                    low.push(snapshot.sku.clone());
                }
                StockStatus::OutOfStock => summary.out_of_stock += 1,
                StockStatus::Discontinued => summary.discontinued += 1,
            }
        }

        low.sort();
        summary.low_stock_skus = low;
        summary
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

        if !self
            .cursors
            .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let mut variants = match self.variants.write() {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };

        match event {
            VariantEvent::VariantCreated(e) => {
                variants.insert(
                    e.variant_id,
                    VariantSnapshot {
                        sku: e.sku,
                        quantity: 0,
                        reorder_level: e.reorder_level,
                        discontinued: false,
                        active: true,
                    },
                );
            }
            VariantEvent::StockMoved(e) => {
                if let Some(s) = variants.get_mut(&e.record.variant_id) {
                    s.quantity = e.record.quantity_after;
                }
            }
            VariantEvent::ReorderLevelSet(e) => {
                if let Some(s) = variants.get_mut(&e.variant_id) {
                    s.reorder_level = e.reorder_level;
                }
            }
            VariantEvent::VariantDiscontinued(e) => {
                if let Some(s) = variants.get_mut(&e.variant_id) {
                    s.discontinued = true;
                }
            }
            VariantEvent::VariantReinstated(e) => {
                if let Some(s) = variants.get_mut(&e.variant_id) {
                    s.discontinued = false;
                }
            }
            VariantEvent::VariantDeactivated(e) => {
                if let Some(s) = variants.get_mut(&e.variant_id) {
                    s.active = false;
                }
            }
            VariantEvent::VariantReactivated(e) => {
                if let Some(s) = variants.get_mut(&e.variant_id) {
                    s.active = true;
                }
            }
        }

        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        self.cursors.clear();
        if let Ok(mut variants) = self.variants.write() {
            variants.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
