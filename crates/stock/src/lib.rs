//! `gemstock-stock` — the stock movement ledger.
//!
//! Every change to a variant's on-hand quantity goes through the `Variant`
//! aggregate and is recorded as an immutable `MovementRecord`. Quantity is a
//! fold over the movement history; nothing mutates it out-of-band.

pub mod history;
pub mod movement;
pub mod status;
pub mod variant;

pub use history::MovementHistory;
pub use movement::{Actor, MovementRecord, MovementType};
pub use status::{StockStatus, derive_status};
pub use variant::{
    ApplyStockDelta, CreateVariant, DeactivateVariant, DiscontinueVariant, ReactivateVariant,
    ReinstateVariant, SetReorderLevel, StockMoved, Variant, VariantCommand, VariantEvent,
    VariantId,
};
