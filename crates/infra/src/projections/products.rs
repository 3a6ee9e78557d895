use serde_json::Value as JsonValue;

use gemstock_catalog::{JewelryCategory, ProductEvent, ProductId, ProductStatus};
use gemstock_events::EventEnvelope;
use gemstock_stock::VariantEvent;

use crate::read_model::ReadModelStore;

use super::{CursorMap, ProjectionApplyError};

/// One row in the product listing screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub product_id: ProductId,
    pub name: String,
    pub category: JewelryCategory,
    pub status: ProductStatus,
    pub variant_count: usize,
}

/// Product list projection.
///
/// Consumes both catalog and stock envelopes: catalog events drive the row
/// itself, variant creation events drive the per-product variant count.
#[derive(Debug)]
pub struct ProductListProjection<S>
where
    S: ReadModelStore<ProductId, ProductRow>,
{
    store: S,
    cursors: CursorMap,
}

impl<S> ProductListProjection<S>
where
    S: ReadModelStore<ProductId, ProductRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: CursorMap::default(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductRow> {
        self.store.get(product_id)
    }

    pub fn list(&self) -> Vec<ProductRow> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        match envelope.aggregate_type() {
            "catalog.product" => self.apply_product(envelope),
            "stock.variant" => self.apply_variant(envelope),
            _ => Ok(()),
        }
    }

    fn apply_product(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        if !self
            .cursors
            .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        match event {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductRow {
                        product_id: e.product_id,
                        name: e.name,
                        category: e.category,
                        status: ProductStatus::Draft,
                        variant_count: 0,
                    },
                );
            }
            ProductEvent::ProductRenamed(e) => {
                if let Some(mut row) = self.store.get(&e.product_id) {
                    row.name = e.name;
                    self.store.upsert(e.product_id, row);
                }
            }
            ProductEvent::ProductActivated(e) => {
                if let Some(mut row) = self.store.get(&e.product_id) {
                    row.status = ProductStatus::Active;
                    self.store.upsert(e.product_id, row);
                }
            }
            ProductEvent::ProductArchived(e) => {
                if let Some(mut row) = self.store.get(&e.product_id) {
                    row.status = ProductStatus::Archived;
                    self.store.upsert(e.product_id, row);
                }
            }
        }

        Ok(())
    }

    fn apply_variant(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionApplyError> {
        let event: VariantEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionApplyError::Deserialize(e.to_string()))?;

        if !self
            .cursors
            .check_and_advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        if let VariantEvent::VariantCreated(e) = event {
            if let Some(mut row) = self.store.get(&e.product_id) {
                row.variant_count += 1;
                self.store.upsert(e.product_id, row);
            }
        }

        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionApplyError> {
        self.cursors.clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        // Catalog events first so variant counts land on existing rows.
        for env in envs.iter().filter(|e| e.aggregate_type() == "catalog.product") {
            self.apply_envelope(env)?;
        }
        for env in envs.iter().filter(|e| e.aggregate_type() != "catalog.product") {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
