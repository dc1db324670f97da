//! Drawdown guard
//!
//! Two independent limits per account: absolute drawdown (10% below the
//! starting balance) and daily drawdown (5% below the UTC-day anchor).
//! Either one breaches the account terminally. Absolute is evaluated
//! first, so it names the breach when both cross in the same tick.

use rust_decimal::Decimal;
use types::account::Account;
use types::numeric::safe_ratio;

/// Absolute drawdown limit as a fraction of the starting balance.
pub fn absolute_limit() -> Decimal {
    // 10%
    Decimal::new(10, 2)
}

/// Daily drawdown limit as a fraction of the day-start anchor.
pub fn daily_limit() -> Decimal {
    // 5%
    Decimal::new(5, 2)
}

/// Which drawdown limit was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawdownKind {
    Absolute,
    Daily,
}

/// A breach detected by the guard.
#[derive(Debug, Clone, PartialEq)]
pub struct BreachSignal {
    pub kind: DrawdownKind,
    pub reason: String,
}

/// Evaluate both drawdown limits for an account at the given equity.
///
/// `today_utc` gates the daily check: the anchor only applies on the UTC
/// day it was snapshotted. A zero starting balance yields a drawdown ratio
/// of zero and never breaches.
pub fn evaluate(account: &Account, equity: Decimal, today_utc: &str) -> Option<BreachSignal> {
    // Absolute drawdown: (S - E) / S >= 10%
    let starting = account.starting_balance;
    let drawdown_ratio = safe_ratio(starting - equity, starting);
    if drawdown_ratio >= absolute_limit() {
        let limit = starting * (Decimal::ONE - absolute_limit());
        return Some(BreachSignal {
            kind: DrawdownKind::Absolute,
            reason: format!(
                "Max drawdown reached: equity {equity} fell below limit {limit}"
            ),
        });
    }

    // Daily drawdown: E <= D × 95% against today's anchor only
    if account.day_start_date.as_deref() == Some(today_utc) {
        let anchor = account.day_start_anchor();
        if anchor > Decimal::ZERO {
            let floor = anchor * (Decimal::ONE - daily_limit());
            if equity <= floor {
                return Some(BreachSignal {
                    kind: DrawdownKind::Daily,
                    reason: format!(
                        "Daily drawdown reached: equity {equity} fell below daily floor {floor}"
                    ),
                });
            }
        }
    }

    None
}
