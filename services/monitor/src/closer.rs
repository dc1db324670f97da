//! Position closer
//!
//! Composes exit price, realized PnL and close fee from a position
//! snapshot and hands the whole mutation to `close_position_atomic`.
//! Losing the close race to another path is expected and benign.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use types::ids::OrderId;
use types::position::{CloseReason, Position};

use crate::ledger::{ClosePositionParams, Ledger, LedgerError};

/// Taker fee applied to the closing notional (0.07%).
pub fn taker_fee_rate() -> Decimal {
    // 7 × 10⁻⁴
    Decimal::new(7, 4)
}

/// Outcome of a close attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call performed the state transition.
    Closed,
    /// Another path closed the position first; nothing to do.
    AlreadyClosed,
}

/// Issues atomic closes against the ledger.
pub struct PositionCloser {
    ledger: Arc<dyn Ledger>,
}

impl PositionCloser {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Close `position` at `exit_price`.
    ///
    /// Safe to invoke twice for the same position: the second call comes
    /// back as `AlreadyClosed`. Everything else propagates.
    pub async fn close(
        &self,
        position: &Position,
        exit_price: Decimal,
        close_reason: CloseReason,
        triggered_order_id: Option<OrderId>,
    ) -> Result<CloseOutcome, LedgerError> {
        let realized_pnl = position.unrealized_pnl(exit_price);
        let close_fee = exit_price * position.quantity * taker_fee_rate();

        let params = ClosePositionParams {
            position_id: position.id,
            account_id: position.account_id,
            exit_price,
            exit_timestamp: Utc::now(),
            realized_pnl,
            close_fee,
            existing_fees: position.trade_fees,
            isolated_margin: position.isolated_margin,
            close_reason,
            triggered_order_id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            quantity: position.quantity,
        };

        match self.ledger.close_position_atomic(params).await {
            Ok(()) => {
                tracing::info!(
                    position_id = %position.id,
                    account_id = %position.account_id,
                    symbol = %position.symbol,
                    reason = close_reason.as_str(),
                    exit_price = %exit_price,
                    realized_pnl = %realized_pnl,
                    "position closed"
                );
                Ok(CloseOutcome::Closed)
            }
            Err(err) if err.is_benign_close_race() => {
                tracing::info!(
                    position_id = %position.id,
                    "already closed by another path"
                );
                Ok(CloseOutcome::AlreadyClosed)
            }
            Err(err) => Err(err),
        }
    }
}
