//! Fallback price loader
//!
//! Symbols that never appear on the streaming feed (forex, metals) are
//! priced from the ledger's `price_cache` table instead. The row's
//! `last_updated` becomes the tick timestamp, so the staleness rule still
//! applies end to end. Purely read-only against the ledger.

use types::ids::Symbol;

use crate::ledger::{Ledger, LedgerError};
use crate::price_cache::PriceCache;

/// Symbols sourced from the ledger rather than the streaming feed.
pub const FALLBACK_SYMBOLS: &[&str] = &[
    "EUR-USD",
    "GBP-USD",
    "USD-JPY",
    "AUD-USD",
    "USD-CAD",
    "XAU-USD",
    "XAG-USD",
];

/// Pulls fallback symbols from the ledger into the price cache.
pub struct FallbackLoader {
    symbols: Vec<Symbol>,
}

impl FallbackLoader {
    pub fn new() -> Self {
        Self {
            symbols: FALLBACK_SYMBOLS.iter().map(|s| Symbol::new(*s)).collect(),
        }
    }

    /// Refresh the cache from the ledger. Returns how many symbols were
    /// upserted; rows with unusable prices are skipped.
    pub async fn refresh(
        &self,
        ledger: &dyn Ledger,
        cache: &PriceCache,
    ) -> Result<usize, LedgerError> {
        let rows = ledger.fetch_price_rows(&self.symbols).await?;

        let mut upserted = 0;
        for row in rows {
            let bid = row.current_bid.unwrap_or(row.current_price);
            let ask = row.current_ask.unwrap_or(row.current_price);
            let timestamp = row.last_updated.timestamp_millis();

            match cache.set(row.symbol.clone(), bid, ask, Some(row.current_price), timestamp) {
                Ok(()) => upserted += 1,
                Err(err) => {
                    tracing::debug!(
                        symbol = %row.symbol,
                        error = %err,
                        "dropping unusable fallback price row"
                    );
                }
            }
        }
        Ok(upserted)
    }
}

impl Default for FallbackLoader {
    fn default() -> Self {
        Self::new()
    }
}
