//! Price tick types and staleness rules
//!
//! A tick is one best-bid/best-ask observation for a symbol. Ticks older
//! than the staleness threshold must never drive a close or a breach.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default staleness threshold in milliseconds.
pub const DEFAULT_STALE_MS: i64 = 30_000;

/// Errors rejecting an invalid tick at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("inverted market: bid {bid} > ask {ask}")]
    InvertedMarket { bid: String, ask: String },

    #[error("negative price: {0}")]
    NegativePrice(String),
}

/// One best-bid/best-ask observation for a symbol.
///
/// Invariant: `bid <= ask`, all prices non-negative. `last` is the mid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    /// Observation time, Unix epoch milliseconds.
    pub timestamp: i64,
}

impl PriceTick {
    /// Build a validated tick. `last` is derived as the bid/ask mid.
    pub fn new(bid: Decimal, ask: Decimal, timestamp: i64) -> Result<Self, TickError> {
        if bid < Decimal::ZERO {
            return Err(TickError::NegativePrice(bid.to_string()));
        }
        if ask < Decimal::ZERO {
            return Err(TickError::NegativePrice(ask.to_string()));
        }
        if bid > ask {
            return Err(TickError::InvertedMarket {
                bid: bid.to_string(),
                ask: ask.to_string(),
            });
        }
        let last = (bid + ask) / Decimal::from(2);
        Ok(Self { bid, ask, last, timestamp })
    }

    /// Build a validated tick with an explicit `last` price (ledger rows
    /// carry their own `current_price`).
    pub fn with_last(
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
        timestamp: i64,
    ) -> Result<Self, TickError> {
        if last < Decimal::ZERO {
            return Err(TickError::NegativePrice(last.to_string()));
        }
        let mut tick = Self::new(bid, ask, timestamp)?;
        tick.last = last;
        Ok(tick)
    }

    /// Whether this tick is fresh enough for financial decisions.
    ///
    /// `now - timestamp <= stale_ms`. A tick from the future (clock skew)
    /// counts as fresh.
    pub fn is_fresh(&self, now_ms: i64, stale_ms: i64) -> bool {
        now_ms - self.timestamp <= stale_ms
    }

    /// Age of the tick in milliseconds at `now_ms` (zero if in the future).
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp).max(0)
    }
}
