//! Order lifecycle types
//!
//! SL/TP orders carry the opposite direction from their parent position.
//! The matcher derives trigger direction from the parent, but the
//! convention must survive round trips because the order-entry path
//! writes it.

use crate::ids::{AccountId, OrderId, PositionId, Symbol};
use crate::position::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Execute immediately at the market price
    Market,
    /// Execute at `price` or better; doubles as a take-profit when linked
    Limit,
    /// Execute when the market crosses `stop_price`; doubles as a stop-loss
    Stop,
    /// Stop that converts into a limit order
    StopLimit,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting a trigger or fill
    Pending,
    /// Partially filled
    Partial,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled by user or system (terminal)
    Cancelled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Order row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    /// Present for SL/TP orders linked to a parent position.
    pub position_id: Option<PositionId>,
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub direction: Direction,
    pub quantity: Decimal,
    pub leverage: Decimal,
    /// Limit price (take-profit trigger when linked)
    pub price: Option<Decimal>,
    /// Stop price (stop-loss trigger when linked)
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
}

impl Order {
    /// Whether this is a position-linked SL/TP order awaiting its trigger.
    pub fn is_pending_sl_tp(&self) -> bool {
        self.position_id.is_some() && self.status == OrderStatus::Pending
    }
}
