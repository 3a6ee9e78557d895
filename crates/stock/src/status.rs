//! Stock status derivation.

use serde::{Deserialize, Serialize};

/// Stock status of a variant.
///
/// `Discontinued` is an explicit operator override; it is never produced by
/// [`derive_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    Discontinued,
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Discontinued => "discontinued",
        };
        f.write_str(s)
    }
}

/// Derive stock status from quantity and reorder level.
///
/// Pure function, no side effects:
/// - `quantity <= 0` → out of stock
/// - `0 < quantity <= reorder_level` → low stock
/// - `quantity > reorder_level` → in stock
pub fn derive_status(quantity: i64, reorder_level: i64) -> StockStatus {
    if quantity <= 0 {
        StockStatus::OutOfStock
    } else if quantity <= reorder_level {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}
