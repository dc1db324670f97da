//! Decimal arithmetic helpers
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). All money, price, PnL, fee and margin math stays in Decimal
//! end to end; rounding happens only at serialization boundaries and uses
//! banker's rounding (half-even).

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Divide `numerator / denominator`, treating division by zero as zero.
///
/// Ratio code paths (drawdown with a zero starting balance, margin level
/// with zero margin used) must degrade to "no signal" rather than error.
pub fn safe_ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        return Decimal::ZERO;
    }
    numerator / denominator
}

/// Round to `dp` decimal places with half-even (banker's) rounding.
///
/// Only for serialization boundaries. Intermediate math never rounds.
pub fn round_half_even(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

/// Parse a decimal from its ledger string form.
///
/// Presentation layers that accept doubles must reconstruct the decimal
/// from the string form provided by the ledger, never from an f64.
pub fn parse_money(s: &str) -> Option<Decimal> {
    Decimal::from_str_exact(s.trim()).ok()
}
