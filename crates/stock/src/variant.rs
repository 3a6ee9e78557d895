//! The `Variant` aggregate: a sellable SKU whose on-hand quantity changes only
//! through movement records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_catalog::ProductId;
use gemstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use gemstock_events::{Command, Event};

use crate::movement::{Actor, MovementRecord, MovementType};
use crate::status::{StockStatus, derive_status};

/// Variant identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub AggregateId);

impl VariantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VariantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Variant.
///
/// `quantity_on_hand` is a fold over the variant's movement history. `handle`
/// never changes it directly; every accepted delta becomes a [`StockMoved`]
/// event carrying the full [`MovementRecord`], and `apply` takes the quantity
/// from the record's `quantity_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    id: VariantId,
    product_id: ProductId,
    sku: String,
    quantity_on_hand: i64,
    reorder_level: i64,
    status: StockStatus,
    discontinued: bool,
    active: bool,
    version: u64,
    created: bool,
}

impl Variant {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: VariantId) -> Self {
        Self {
            id,
            product_id: ProductId::new(AggregateId::nil()),
            sku: String::new(),
            quantity_on_hand: 0,
            reorder_level: 0,
            status: StockStatus::OutOfStock,
            discontinued: false,
            active: true,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VariantId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn reorder_level(&self) -> i64 {
        self.reorder_level
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn is_discontinued(&self) -> bool {
        self.discontinued
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for Variant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateVariant.
///
/// A non-zero `initial_quantity` is not a free write to the quantity field; it
/// produces an `initial_stock` movement so the opening balance is on the
/// ledger like everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVariant {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub reorder_level: i64,
    pub initial_quantity: Option<i64>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyStockDelta.
///
/// The single write path for quantity changes. Positive deltas add stock,
/// negative deltas remove it; a delta that would take the quantity below zero
/// is rejected and nothing is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStockDelta {
    pub variant_id: VariantId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetReorderLevel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderLevel {
    pub variant_id: VariantId,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscontinueVariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscontinueVariant {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReinstateVariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinstateVariant {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateVariant (soft delete; history is kept).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateVariant {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateVariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateVariant {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantCommand {
    CreateVariant(CreateVariant),
    ApplyStockDelta(ApplyStockDelta),
    SetReorderLevel(SetReorderLevel),
    DiscontinueVariant(DiscontinueVariant),
    ReinstateVariant(ReinstateVariant),
    DeactivateVariant(DeactivateVariant),
    ReactivateVariant(ReactivateVariant),
}

impl Command for VariantCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            VariantCommand::CreateVariant(c) => c.variant_id.0,
            VariantCommand::ApplyStockDelta(c) => c.variant_id.0,
            VariantCommand::SetReorderLevel(c) => c.variant_id.0,
            VariantCommand::DiscontinueVariant(c) => c.variant_id.0,
            VariantCommand::ReinstateVariant(c) => c.variant_id.0,
            VariantCommand::DeactivateVariant(c) => c.variant_id.0,
            VariantCommand::ReactivateVariant(c) => c.variant_id.0,
        }
    }
}

/// Event: VariantCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantCreated {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. Carries the complete movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub record: MovementRecord,
}

/// Event: ReorderLevelSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderLevelSet {
    pub variant_id: VariantId,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantDiscontinued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDiscontinued {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantReinstated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantReinstated {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDeactivated {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantReactivated {
    pub variant_id: VariantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantEvent {
    VariantCreated(VariantCreated),
    StockMoved(StockMoved),
    ReorderLevelSet(ReorderLevelSet),
    VariantDiscontinued(VariantDiscontinued),
    VariantReinstated(VariantReinstated),
    VariantDeactivated(VariantDeactivated),
    VariantReactivated(VariantReactivated),
}

impl Event for VariantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VariantEvent::VariantCreated(_) => "stock.variant.created",
            VariantEvent::StockMoved(_) => "stock.variant.moved",
            VariantEvent::ReorderLevelSet(_) => "stock.variant.reorder_level_set",
            VariantEvent::VariantDiscontinued(_) => "stock.variant.discontinued",
            VariantEvent::VariantReinstated(_) => "stock.variant.reinstated",
            VariantEvent::VariantDeactivated(_) => "stock.variant.deactivated",
            VariantEvent::VariantReactivated(_) => "stock.variant.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VariantEvent::VariantCreated(e) => e.occurred_at,
            VariantEvent::StockMoved(e) => e.record.occurred_at,
            VariantEvent::ReorderLevelSet(e) => e.occurred_at,
            VariantEvent::VariantDiscontinued(e) => e.occurred_at,
            VariantEvent::VariantReinstated(e) => e.occurred_at,
            VariantEvent::VariantDeactivated(e) => e.occurred_at,
            VariantEvent::VariantReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Variant {
    type Command = VariantCommand;
    type Event = VariantEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VariantEvent::VariantCreated(e) => {
                self.id = e.variant_id;
                self.product_id = e.product_id;
                self.sku = e.sku.clone();
                self.reorder_level = e.reorder_level;
                self.quantity_on_hand = 0;
                self.discontinued = false;
                self.active = true;
                self.created = true;
            }
            VariantEvent::StockMoved(e) => {
                self.quantity_on_hand = e.record.quantity_after;
            }
            VariantEvent::ReorderLevelSet(e) => {
                self.reorder_level = e.reorder_level;
            }
            VariantEvent::VariantDiscontinued(_) => {
                self.discontinued = true;
            }
            VariantEvent::VariantReinstated(_) => {
                self.discontinued = false;
            }
            VariantEvent::VariantDeactivated(_) => {
                self.active = false;
            }
            VariantEvent::VariantReactivated(_) => {
                self.active = true;
            }
        }

        // Status is derived state. The discontinued override wins; otherwise it
        // follows quantity vs reorder level after every event.
        self.status = if self.discontinued {
            StockStatus::Discontinued
        } else {
            derive_status(self.quantity_on_hand, self.reorder_level)
        };

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VariantCommand::CreateVariant(cmd) => self.handle_create(cmd),
            VariantCommand::ApplyStockDelta(cmd) => self.handle_apply_delta(cmd),
            VariantCommand::SetReorderLevel(cmd) => self.handle_set_reorder_level(cmd),
            VariantCommand::DiscontinueVariant(cmd) => self.handle_discontinue(cmd),
            VariantCommand::ReinstateVariant(cmd) => self.handle_reinstate(cmd),
            VariantCommand::DeactivateVariant(cmd) => self.handle_deactivate(cmd),
            VariantCommand::ReactivateVariant(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Variant {
    fn ensure_exists(&self, variant_id: VariantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != variant_id {
            return Err(DomainError::invariant("variant_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateVariant) -> Result<Vec<VariantEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("variant already exists"));
        }

        let sku = cmd.sku.trim().to_uppercase();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.reorder_level < 0 {
            return Err(DomainError::validation("reorder_level cannot be negative"));
        }

        let mut events = vec![VariantEvent::VariantCreated(VariantCreated {
            variant_id: cmd.variant_id,
            product_id: cmd.product_id,
            sku,
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })];

        match cmd.initial_quantity {
            None | Some(0) => {}
            Some(q) if q < 0 => {
                return Err(DomainError::validation(
                    "initial_quantity cannot be negative",
                ));
            }
            Some(q) => {
                let record = MovementRecord::new(
                    cmd.variant_id,
                    MovementType::InitialStock,
                    0,
                    q,
                    "opening balance",
                    cmd.actor,
                    cmd.occurred_at,
                )?;
                events.push(VariantEvent::StockMoved(StockMoved { record }));
            }
        }

        Ok(events)
    }

    fn handle_apply_delta(&self, cmd: &ApplyStockDelta) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if !self.active {
            return Err(DomainError::invariant(
                "stock cannot move on a deactivated variant",
            ));
        }
        if self.discontinued && cmd.delta < 0 {
            return Err(DomainError::invariant(
                "stock cannot leave a discontinued variant",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("movement reason cannot be empty"));
        }

        // MovementRecord::new enforces the ledger arithmetic: non-zero delta,
        // no overflow, and the InsufficientStock guard.
        let record = MovementRecord::new(
            self.id,
            cmd.movement_type,
            self.quantity_on_hand,
            cmd.delta,
            cmd.reason.trim(),
            cmd.actor,
            cmd.occurred_at,
        )?;

        Ok(vec![VariantEvent::StockMoved(StockMoved { record })])
    }

    fn handle_set_reorder_level(
        &self,
        cmd: &SetReorderLevel,
    ) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if cmd.reorder_level < 0 {
            return Err(DomainError::validation("reorder_level cannot be negative"));
        }
        if cmd.reorder_level == self.reorder_level {
            return Err(DomainError::conflict("reorder level is unchanged"));
        }

        Ok(vec![VariantEvent::ReorderLevelSet(ReorderLevelSet {
            variant_id: cmd.variant_id,
            reorder_level: cmd.reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discontinue(
        &self,
        cmd: &DiscontinueVariant,
    ) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if self.discontinued {
            return Err(DomainError::conflict("variant is already discontinued"));
        }

        Ok(vec![VariantEvent::VariantDiscontinued(VariantDiscontinued {
            variant_id: cmd.variant_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reinstate(&self, cmd: &ReinstateVariant) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if !self.discontinued {
            return Err(DomainError::conflict("variant is not discontinued"));
        }

        Ok(vec![VariantEvent::VariantReinstated(VariantReinstated {
            variant_id: cmd.variant_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateVariant) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if !self.active {
            return Err(DomainError::conflict("variant is already deactivated"));
        }

        Ok(vec![VariantEvent::VariantDeactivated(VariantDeactivated {
            variant_id: cmd.variant_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateVariant) -> Result<Vec<VariantEvent>, DomainError> {
        self.ensure_exists(cmd.variant_id)?;

        if self.active {
            return Err(DomainError::conflict("variant is already active"));
        }

        Ok(vec![VariantEvent::VariantReactivated(VariantReactivated {
            variant_id: cmd.variant_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_variant_id() -> VariantId {
        VariantId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(variant_id: VariantId, initial_quantity: Option<i64>) -> CreateVariant {
        CreateVariant {
            variant_id,
            product_id: test_product_id(),
            sku: "ring-001-a".to_string(),
            reorder_level: 5,
            initial_quantity,
            actor: Actor::system(),
            occurred_at: test_time(),
        }
    }

    fn created_variant(initial_quantity: Option<i64>) -> Variant {
        let variant_id = test_variant_id();
        let mut variant = Variant::empty(variant_id);
        let events = variant
            .handle(&VariantCommand::CreateVariant(create_cmd(
                variant_id,
                initial_quantity,
            )))
            .unwrap();
        for ev in &events {
            variant.apply(ev);
        }
        variant
    }

    fn delta_cmd(variant: &Variant, delta: i64, movement_type: MovementType) -> ApplyStockDelta {
        ApplyStockDelta {
            variant_id: variant.id_typed(),
            delta,
            movement_type,
            reason: "test movement".to_string(),
            actor: Actor::system(),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_normalizes_sku_to_uppercase() {
        let variant = created_variant(None);
        assert_eq!(variant.sku(), "RING-001-A");
        assert_eq!(variant.quantity_on_hand(), 0);
        assert_eq!(variant.status(), StockStatus::OutOfStock);
    }

    #[test]
    fn create_with_initial_quantity_emits_opening_balance_movement() {
        let variant_id = test_variant_id();
        let variant = Variant::empty(variant_id);

        let events = variant
            .handle(&VariantCommand::CreateVariant(create_cmd(
                variant_id,
                Some(10),
            )))
            .unwrap();
        assert_eq!(events.len(), 2);

        match &events[1] {
            VariantEvent::StockMoved(e) => {
                assert_eq!(e.record.movement_type, MovementType::InitialStock);
                assert_eq!(e.record.quantity_before, 0);
                assert_eq!(e.record.quantity_delta, 10);
                assert_eq!(e.record.quantity_after, 10);
                assert_eq!(e.record.reason, "opening balance");
            }
            other => panic!("expected StockMoved, got {other:?}"),
        }
    }

    #[test]
    fn create_with_zero_initial_quantity_emits_no_movement() {
        let variant_id = test_variant_id();
        let variant = Variant::empty(variant_id);

        let events = variant
            .handle(&VariantCommand::CreateVariant(create_cmd(
                variant_id,
                Some(0),
            )))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn create_rejects_negative_initial_quantity() {
        let variant_id = test_variant_id();
        let variant = Variant::empty(variant_id);

        let err = variant
            .handle(&VariantCommand::CreateVariant(create_cmd(
                variant_id,
                Some(-3),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_delta_reduces_quantity_and_updates_status() {
        let mut variant = created_variant(Some(20));
        assert_eq!(variant.status(), StockStatus::InStock);

        let events = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                -15,
                MovementType::Sale,
            )))
            .unwrap();
        variant.apply(&events[0]);

        assert_eq!(variant.quantity_on_hand(), 5);
        assert_eq!(variant.status(), StockStatus::LowStock);

        let events = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                -5,
                MovementType::Sale,
            )))
            .unwrap();
        variant.apply(&events[0]);

        assert_eq!(variant.quantity_on_hand(), 0);
        assert_eq!(variant.status(), StockStatus::OutOfStock);
    }

    #[test]
    fn delta_below_zero_is_rejected_and_nothing_changes() {
        let mut variant = created_variant(Some(20));
        for delta in [-15, -5] {
            let events = variant
                .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                    &variant,
                    delta,
                    MovementType::Sale,
                )))
                .unwrap();
            variant.apply(&events[0]);
        }
        assert_eq!(variant.quantity_on_hand(), 0);
        let version_before = variant.version();

        let err = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                -1,
                MovementType::Sale,
            )))
            .unwrap_err();

        match err {
            DomainError::InsufficientStock {
                available,
                requested,
            } => {
                assert_eq!(available, 0);
                assert_eq!(requested, -1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(variant.quantity_on_hand(), 0);
        assert_eq!(variant.version(), version_before);
    }

    #[test]
    fn restock_from_empty_records_full_arithmetic() {
        let mut variant = created_variant(None);

        let events = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                10,
                MovementType::Restock,
            )))
            .unwrap();

        match &events[0] {
            VariantEvent::StockMoved(e) => {
                assert_eq!(e.record.quantity_before, 0);
                assert_eq!(e.record.quantity_delta, 10);
                assert_eq!(e.record.quantity_after, 10);
            }
            other => panic!("expected StockMoved, got {other:?}"),
        }

        variant.apply(&events[0]);
        assert_eq!(variant.quantity_on_hand(), 10);
        assert_eq!(variant.status(), StockStatus::InStock);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let variant = created_variant(Some(5));
        let err = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                0,
                MovementType::Adjustment,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn delta_on_unknown_variant_is_not_found() {
        let variant = Variant::empty(test_variant_id());
        let err = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                5,
                MovementType::Restock,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn reorder_level_change_rederives_status() {
        let mut variant = created_variant(Some(10));
        assert_eq!(variant.status(), StockStatus::InStock);

        let events = variant
            .handle(&VariantCommand::SetReorderLevel(SetReorderLevel {
                variant_id: variant.id_typed(),
                reorder_level: 12,
                occurred_at: test_time(),
            }))
            .unwrap();
        variant.apply(&events[0]);

        assert_eq!(variant.reorder_level(), 12);
        assert_eq!(variant.status(), StockStatus::LowStock);
    }

    #[test]
    fn discontinue_overrides_derived_status_until_reinstated() {
        let mut variant = created_variant(Some(10));

        let events = variant
            .handle(&VariantCommand::DiscontinueVariant(DiscontinueVariant {
                variant_id: variant.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert_eq!(variant.status(), StockStatus::Discontinued);

        // Stock can still come back in (returns) but cannot leave.
        let err = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                -1,
                MovementType::Sale,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let events = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                2,
                MovementType::Return,
            )))
            .unwrap();
        variant.apply(&events[0]);
        assert_eq!(variant.quantity_on_hand(), 12);
        assert_eq!(variant.status(), StockStatus::Discontinued);

        let events = variant
            .handle(&VariantCommand::ReinstateVariant(ReinstateVariant {
                variant_id: variant.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert_eq!(variant.status(), StockStatus::InStock);
    }

    #[test]
    fn deactivated_variant_rejects_all_movements() {
        let mut variant = created_variant(Some(10));

        let events = variant
            .handle(&VariantCommand::DeactivateVariant(DeactivateVariant {
                variant_id: variant.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert!(!variant.is_active());

        let err = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                5,
                MovementType::Restock,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let events = variant
            .handle(&VariantCommand::ReactivateVariant(ReactivateVariant {
                variant_id: variant.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert!(variant.is_active());
        // History survives the deactivate/reactivate cycle.
        assert_eq!(variant.quantity_on_hand(), 10);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let variant = created_variant(Some(10));
        let before = variant.clone();

        let _ = variant
            .handle(&VariantCommand::ApplyStockDelta(delta_cmd(
                &variant,
                -3,
                MovementType::Sale,
            )))
            .unwrap();

        assert_eq!(variant, before);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: quantity is always the sum of accepted deltas and
            /// never goes negative, regardless of the delta sequence.
            #[test]
            fn quantity_is_fold_of_accepted_deltas(
                deltas in proptest::collection::vec(-50i64..50, 1..40),
            ) {
                let mut variant = created_variant(None);
                let mut expected = 0i64;

                for delta in deltas {
                    let cmd = VariantCommand::ApplyStockDelta(delta_cmd(
                        &variant,
                        delta,
                        MovementType::Adjustment,
                    ));
                    match variant.handle(&cmd) {
                        Ok(events) => {
                            for ev in &events {
                                variant.apply(ev);
                            }
                            expected += delta;
                        }
                        Err(DomainError::Validation(_)) => prop_assert_eq!(delta, 0),
                        Err(DomainError::InsufficientStock { .. }) => {
                            prop_assert!(expected + delta < 0);
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                    }
                    prop_assert_eq!(variant.quantity_on_hand(), expected);
                    prop_assert!(variant.quantity_on_hand() >= 0);
                }
            }

            /// Property: each accepted movement chains off the previous one
            /// (`quantity_before` equals the prior `quantity_after`).
            #[test]
            fn movements_chain_without_gaps(
                deltas in proptest::collection::vec(-30i64..60, 1..30),
            ) {
                let mut variant = created_variant(None);
                let mut last_after = 0i64;

                for delta in deltas {
                    let cmd = VariantCommand::ApplyStockDelta(delta_cmd(
                        &variant,
                        delta,
                        MovementType::Adjustment,
                    ));
                    if let Ok(events) = variant.handle(&cmd) {
                        let VariantEvent::StockMoved(e) = &events[0] else {
                            return Err(TestCaseError::fail("expected StockMoved"));
                        };
                        prop_assert_eq!(e.record.quantity_before, last_after);
                        prop_assert_eq!(
                            e.record.quantity_after,
                            e.record.quantity_before + e.record.quantity_delta
                        );
                        last_after = e.record.quantity_after;
                        variant.apply(&events[0]);
                    }
                }
            }

            /// Property: status always agrees with quantity and reorder level
            /// for non-discontinued variants.
            #[test]
            fn status_tracks_quantity(
                initial in 0i64..100,
                deltas in proptest::collection::vec(-40i64..40, 0..20),
                reorder in 0i64..20,
            ) {
                let variant_id = test_variant_id();
                let mut variant = Variant::empty(variant_id);
                let mut cmd = create_cmd(variant_id, Some(initial));
                cmd.reorder_level = reorder;
                let events = variant
                    .handle(&VariantCommand::CreateVariant(cmd))
                    .unwrap();
                for ev in &events {
                    variant.apply(ev);
                }

                for delta in deltas {
                    let cmd = VariantCommand::ApplyStockDelta(delta_cmd(
                        &variant,
                        delta,
                        MovementType::Adjustment,
                    ));
                    if let Ok(events) = variant.handle(&cmd) {
                        for ev in &events {
                            variant.apply(ev);
                        }
                    }
                    prop_assert_eq!(
                        variant.status(),
                        derive_status(variant.quantity_on_hand(), variant.reorder_level())
                    );
                }
            }
        }
    }
}
