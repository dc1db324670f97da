//! Instrument configuration
//!
//! Instruments are owned by the ledger and read-only for the engine.

use crate::ids::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tradeable instrument configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub quote_currency: String,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    pub max_leverage: Decimal,
    pub min_order_size: Decimal,
    pub is_active: bool,
}

impl Instrument {
    /// Notional exposure at a given price and quantity.
    pub fn notional(&self, price: Decimal, quantity: Decimal) -> Decimal {
        price * quantity
    }
}
