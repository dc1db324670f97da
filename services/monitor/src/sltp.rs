//! Stop-loss / take-profit matcher
//!
//! Evaluates every pending position-linked order against the current tick
//! and closes the parent position when a trigger crosses. The trigger side
//! is derived from the parent position, not from the order's (inverted)
//! direction. Within one tick a stop-loss beats a take-profit on the same
//! position; across ticks the atomic close RPC makes the first winner
//! final.

use rust_decimal::Decimal;
use std::collections::HashMap;
use types::ids::PositionId;
use types::order::{Order, OrderType};
use types::position::{CloseReason, Direction, Position};

use crate::closer::{CloseOutcome, PositionCloser};
use crate::price_cache::PriceCache;

/// Which trigger crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Sl,
    Tp,
}

impl TriggerKind {
    pub fn close_reason(self) -> CloseReason {
        match self {
            TriggerKind::Sl => CloseReason::Sl,
            TriggerKind::Tp => CloseReason::Tp,
        }
    }
}

/// Evaluate one pending order against its parent position's exit price.
///
/// Stop orders fire when the market moves against the position through
/// `stop_price`; limit orders fire when it moves in favor through `price`.
pub fn evaluate_trigger(
    order: &Order,
    position: &Position,
    exit_price: Decimal,
) -> Option<TriggerKind> {
    match order.order_type {
        OrderType::Stop => {
            let stop_price = order.stop_price?;
            let crossed = match position.direction {
                Direction::Long => exit_price <= stop_price,
                Direction::Short => exit_price >= stop_price,
            };
            crossed.then_some(TriggerKind::Sl)
        }
        OrderType::Limit => {
            let price = order.price?;
            let crossed = match position.direction {
                Direction::Long => exit_price >= price,
                Direction::Short => exit_price <= price,
            };
            crossed.then_some(TriggerKind::Tp)
        }
        // Market and stop-limit orders are not SL/TP triggers.
        _ => None,
    }
}

/// One evaluation pass over this tick's open positions and pending orders.
///
/// Returns the number of positions closed by this pass.
pub async fn run_matcher(
    positions: &[Position],
    orders: &[Order],
    cache: &PriceCache,
    closer: &PositionCloser,
    now_ms: i64,
) -> usize {
    let by_id: HashMap<PositionId, &Position> =
        positions.iter().map(|p| (p.id, p)).collect();

    // Collect triggers per position, preserving ledger order within each.
    let mut triggered: HashMap<PositionId, Vec<(&Order, TriggerKind, Decimal)>> =
        HashMap::new();
    let mut position_order: Vec<PositionId> = Vec::new();

    for order in orders {
        let Some(position_id) = order.position_id else { continue };
        let Some(position) = by_id.get(&position_id) else { continue };

        let Some(tick) = cache.get_fresh(&position.symbol, now_ms) else {
            tracing::debug!(
                position_id = %position_id,
                symbol = %position.symbol,
                "skipping order: no fresh tick"
            );
            continue;
        };
        let exit_price = position.exit_price_from(&tick);

        if let Some(kind) = evaluate_trigger(order, position, exit_price) {
            if !triggered.contains_key(&position_id) {
                position_order.push(position_id);
            }
            triggered
                .entry(position_id)
                .or_default()
                .push((order, kind, exit_price));
        }
    }

    let mut closed = 0;
    for position_id in position_order {
        let candidates = &triggered[&position_id];
        let position = by_id[&position_id];

        // SL wins over TP when both cross in the same tick (a price gap
        // spanning both triggers); otherwise first in ledger order.
        let chosen = candidates
            .iter()
            .find(|candidate| candidate.1 == TriggerKind::Sl)
            .unwrap_or(&candidates[0]);
        let (order, kind, exit_price) = *chosen;

        match closer
            .close(position, exit_price, kind.close_reason(), Some(order.id))
            .await
        {
            Ok(CloseOutcome::Closed) => closed += 1,
            Ok(CloseOutcome::AlreadyClosed) => {}
            Err(err) => {
                tracing::warn!(
                    position_id = %position_id,
                    error = %err,
                    "sl/tp close failed; retrying next tick"
                );
            }
        }
    }

    closed
}
