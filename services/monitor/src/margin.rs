//! Margin-level guard
//!
//! Per account: equity = realized net worth plus the mark-to-market PnL of
//! every open position with a fresh tick. Margin level is
//! `100 × equity / total_margin_required`. At 100% the account gets a
//! margin call (log only); at 50% the single worst position is stopped
//! out.

use rust_decimal::Decimal;
use types::account::Account;
use types::numeric::safe_ratio;
use types::position::Position;

use crate::price_cache::PriceCache;

/// Margin call threshold in percent.
pub fn margin_call_level() -> Decimal {
    Decimal::from(100)
}

/// Stop-out threshold in percent.
pub fn stop_out_level() -> Decimal {
    Decimal::from(50)
}

/// One open position marked against its current exit price.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub position: Position,
    pub exit_price: Decimal,
    pub unrealized: Decimal,
}

/// Mark every position that has a fresh tick. Positions with a missing or
/// stale tick are excluded entirely: they contribute no unrealized PnL and
/// can never be selected for a forced close.
pub fn mark_positions(positions: &[Position], cache: &PriceCache, now_ms: i64) -> Vec<Mark> {
    positions
        .iter()
        .filter_map(|position| {
            let tick = cache.get_fresh(&position.symbol, now_ms)?;
            let exit_price = position.exit_price_from(&tick);
            Some(Mark {
                exit_price,
                unrealized: position.unrealized_pnl(exit_price),
                position: position.clone(),
            })
        })
        .collect()
}

/// Account equity over the given marks.
pub fn equity(account: &Account, marks: &[Mark]) -> Decimal {
    let total_unrealized: Decimal = marks.iter().map(|m| m.unrealized).sum();
    account.equity(total_unrealized)
}

/// Outcome of the margin-level evaluation for one account.
#[derive(Debug, Clone, PartialEq)]
pub enum MarginVerdict {
    /// Margin level above 100%, or no margin in use.
    Healthy,
    /// Margin level at or below 100%: notify, change nothing.
    MarginCall { margin_level_pct: Decimal },
    /// Margin level at or below 50%: force-close the worst position.
    StopOut {
        victim: Mark,
        margin_level_pct: Decimal,
    },
}

/// Evaluate the margin level for one account.
///
/// The stop-out victim is the most negative unrealized PnL; ties break to
/// the highest isolated margin, then the lowest id.
pub fn evaluate(account: &Account, marks: &[Mark]) -> MarginVerdict {
    let margin_used = account.total_margin_required;
    if margin_used == Decimal::ZERO {
        return MarginVerdict::Healthy;
    }

    let eq = equity(account, marks);
    let margin_level_pct = Decimal::from(100) * safe_ratio(eq, margin_used);

    if margin_level_pct <= stop_out_level() {
        if let Some(victim) = worst_mark(marks) {
            return MarginVerdict::StopOut {
                victim: victim.clone(),
                margin_level_pct,
            };
        }
        // Every position is stale: no forced close without a price.
        return MarginVerdict::Healthy;
    }

    if margin_level_pct <= margin_call_level() {
        return MarginVerdict::MarginCall { margin_level_pct };
    }

    MarginVerdict::Healthy
}

/// The worst mark by unrealized PnL, then isolated margin, then id.
fn worst_mark(marks: &[Mark]) -> Option<&Mark> {
    marks.iter().min_by(|a, b| {
        a.unrealized
            .cmp(&b.unrealized)
            .then(b.position.isolated_margin.cmp(&a.position.isolated_margin))
            .then(a.position.id.cmp(&b.position.id))
    })
}
