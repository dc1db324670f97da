//! Position lifecycle types
//!
//! A position is created by `place_market_order`, mutated to closed only by
//! `close_position_atomic`, and never deleted in normal operation.

use crate::ids::{AccountId, PositionId, Symbol};
use crate::tick::PriceTick;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Profits when price increases; closes at the bid
    Long,
    /// Profits when price decreases; closes at the ask
    Short,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Ledger column value
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// Position status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Trader-initiated close
    Manual,
    /// Stop-loss trigger
    Sl,
    /// Take-profit trigger
    Tp,
    /// Forced close (stop-out or breach)
    Liquidation,
    /// Administrative close
    AdminForce,
}

impl CloseReason {
    /// Ledger column value
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Manual => "manual",
            CloseReason::Sl => "sl",
            CloseReason::Tp => "tp",
            CloseReason::Liquidation => "liquidation",
            CloseReason::AdminForce => "admin_force",
        }
    }
}

/// Position row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: Decimal,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    /// Margin reserved for this position: entry_price × quantity / leverage
    pub isolated_margin: Decimal,
    /// Fees accumulated so far (entry fee plus any adjustments)
    pub trade_fees: Decimal,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    pub exit_price: Option<Decimal>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
    pub entry_timestamp: DateTime<Utc>,
    pub original_quantity: Decimal,
}

impl Position {
    /// Whether the position is still open.
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// The price this position would close at given a tick.
    ///
    /// A long closes at the bid, a short at the ask.
    pub fn exit_price_from(&self, tick: &PriceTick) -> Decimal {
        match self.direction {
            Direction::Long => tick.bid,
            Direction::Short => tick.ask,
        }
    }

    /// Signed mark-to-market PnL at `exit_price`.
    ///
    /// LONG:  `(exit - entry) × quantity × leverage`
    /// SHORT: `(entry - exit) × quantity × leverage`
    pub fn unrealized_pnl(&self, exit_price: Decimal) -> Decimal {
        let price_diff = match self.direction {
            Direction::Long => exit_price - self.entry_price,
            Direction::Short => self.entry_price - exit_price,
        };
        price_diff * self.quantity * self.leverage
    }

    /// Notional exposure at entry.
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}

/// Isolated margin for a new position: `entry_price × quantity / leverage`.
///
/// Returns zero for zero leverage rather than dividing by zero.
pub fn isolated_margin(entry_price: Decimal, quantity: Decimal, leverage: Decimal) -> Decimal {
    if leverage == Decimal::ZERO {
        return Decimal::ZERO;
    }
    entry_price * quantity / leverage
}
