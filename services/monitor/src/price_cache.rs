//! Concurrent in-memory price cache
//!
//! Maps `symbol → latest tick`, last-writer-wins. One producer per symbol
//! (the feed reader for crypto, the fallback loader for everything else),
//! many readers per tick. Carries no history.

use dashmap::DashMap;
use rust_decimal::Decimal;
use types::ids::Symbol;
use types::tick::{PriceTick, TickError};

/// Shared symbol → latest-tick map.
#[derive(Debug)]
pub struct PriceCache {
    map: DashMap<Symbol, PriceTick>,
    stale_ms: i64,
}

impl PriceCache {
    /// Create a cache with the given staleness threshold.
    pub fn new(stale_ms: i64) -> Self {
        Self {
            map: DashMap::new(),
            stale_ms,
        }
    }

    /// Overwrite the tick for a symbol atomically.
    ///
    /// Rejects inverted or negative prices; `last` defaults to the mid
    /// when the source has no trade price.
    pub fn set(
        &self,
        symbol: Symbol,
        bid: Decimal,
        ask: Decimal,
        last: Option<Decimal>,
        timestamp: i64,
    ) -> Result<(), TickError> {
        let tick = match last {
            Some(last) => PriceTick::with_last(bid, ask, last, timestamp)?,
            None => PriceTick::new(bid, ask, timestamp)?,
        };
        self.map.insert(symbol, tick);
        Ok(())
    }

    /// Latest tick for a symbol, fresh or not.
    pub fn get(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.map.get(symbol).map(|entry| *entry.value())
    }

    /// Latest tick only if it is fresh at `now_ms`.
    pub fn get_fresh(&self, symbol: &Symbol, now_ms: i64) -> Option<PriceTick> {
        self.get(symbol)
            .filter(|tick| tick.is_fresh(now_ms, self.stale_ms))
    }

    /// Whether a tick is fresh under this cache's threshold.
    pub fn is_fresh(&self, tick: &PriceTick, now_ms: i64) -> bool {
        tick.is_fresh(now_ms, self.stale_ms)
    }

    /// Number of symbols cached.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of symbols with a fresh tick at `now_ms`.
    pub fn fresh_count(&self, now_ms: i64) -> usize {
        self.map
            .iter()
            .filter(|entry| entry.value().is_fresh(now_ms, self.stale_ms))
            .count()
    }

    /// The configured staleness threshold in milliseconds.
    pub fn stale_ms(&self) -> i64 {
        self.stale_ms
    }
}
