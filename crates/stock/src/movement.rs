//! Movement records: the immutable audit rows of the stock ledger.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_core::{DomainError, DomainResult, UserId};

use crate::variant::VariantId;

/// Why a variant's quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Restock,
    Sale,
    Adjustment,
    Damage,
    Loss,
    Return,
    Transfer,
    InitialStock,
    ManualEdit,
    StockOut,
}

impl MovementType {
    pub const ALL: [MovementType; 10] = [
        MovementType::Restock,
        MovementType::Sale,
        MovementType::Adjustment,
        MovementType::Damage,
        MovementType::Loss,
        MovementType::Return,
        MovementType::Transfer,
        MovementType::InitialStock,
        MovementType::ManualEdit,
        MovementType::StockOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Restock => "restock",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Damage => "damage",
            MovementType::Loss => "loss",
            MovementType::Return => "return",
            MovementType::Transfer => "transfer",
            MovementType::InitialStock => "initial_stock",
            MovementType::ManualEdit => "manual_edit",
            MovementType::StockOut => "stock_out",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    /// Parse the wire form of a movement type.
    ///
    /// Unrecognized values are rejected before any write.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::InvalidMovementType(s.to_string()))
    }
}

/// Who caused a movement. `System` covers movements without a user context
/// (imports, automated corrections).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User(UserId),
    System,
}

impl Actor {
    pub fn user(id: UserId) -> Self {
        Actor::User(id)
    }

    pub fn system() -> Self {
        Actor::System
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::System => None,
        }
    }
}

/// One recorded change to a variant's on-hand quantity.
///
/// Records are created only by the `Variant` aggregate and never updated or
/// deleted. Construction validates the ledger arithmetic, so a record that
/// exists is internally consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub variant_id: VariantId,
    pub movement_type: MovementType,
    pub quantity_before: i64,
    pub quantity_delta: i64,
    pub quantity_after: i64,
    pub reason: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Build a record from a starting quantity and a delta.
    ///
    /// Fails when the delta is zero or the resulting quantity would be
    /// negative; `quantity_after` is always `quantity_before + quantity_delta`.
    pub fn new(
        variant_id: VariantId,
        movement_type: MovementType,
        quantity_before: i64,
        quantity_delta: i64,
        reason: impl Into<String>,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity_delta == 0 {
            return Err(DomainError::validation("movement delta cannot be zero"));
        }
        if quantity_before < 0 {
            return Err(DomainError::invariant("quantity_before cannot be negative"));
        }

        let quantity_after = quantity_before
            .checked_add(quantity_delta)
            .ok_or_else(|| DomainError::validation("movement delta overflows quantity"))?;

        if quantity_after < 0 {
            return Err(DomainError::insufficient_stock(
                quantity_before,
                quantity_delta,
            ));
        }

        Ok(Self {
            variant_id,
            movement_type,
            quantity_before,
            quantity_delta,
            quantity_after,
            reason: reason.into(),
            actor,
            occurred_at,
        })
    }
}
