//! Account state types
//!
//! `net_worth` is the realized balance and excludes open-position
//! unrealized PnL; equity is computed per tick by the monitor. Once an
//! account is `breached` it is terminal for the engine.

use crate::ids::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Challenge account, trading normally
    Active,
    /// Funded account, trading normally
    Funded,
    /// Challenge passed, awaiting next phase
    Passed,
    /// Drawdown limit crossed (terminal for the engine)
    Breached,
    /// Permanently closed
    Closed,
}

/// Account row as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: String,
    /// Initial balance; never mutates after account creation.
    pub starting_balance: Decimal,
    /// Free cash not backing any position.
    pub available_margin: Decimal,
    /// Sum of isolated margin across open positions.
    pub total_margin_required: Decimal,
    /// Realized balance; excludes open-position unrealized PnL.
    pub net_worth: Decimal,
    pub realized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub account_status: AccountStatus,
    pub breach_reason: Option<String>,
    pub day_start_balance: Option<Decimal>,
    pub day_start_equity: Option<Decimal>,
    /// UTC calendar day of the current daily-drawdown anchor ("%Y-%m-%d").
    pub day_start_date: Option<String>,
    pub current_phase: Option<String>,
}

impl Account {
    /// Whether the engine monitors this account.
    pub fn is_active(&self) -> bool {
        matches!(
            self.account_status,
            AccountStatus::Active | AccountStatus::Funded
        )
    }

    /// Whether the account has reached its terminal breached state.
    pub fn is_breached(&self) -> bool {
        self.account_status == AccountStatus::Breached
    }

    /// Equity given the summed unrealized PnL of open positions.
    pub fn equity(&self, total_unrealized_pnl: Decimal) -> Decimal {
        self.net_worth + total_unrealized_pnl
    }

    /// The daily-drawdown anchor: the larger of the two day-start
    /// snapshots, tolerating either snapshot convention.
    pub fn day_start_anchor(&self) -> Decimal {
        let balance = self.day_start_balance.unwrap_or(Decimal::ZERO);
        let equity = self.day_start_equity.unwrap_or(Decimal::ZERO);
        balance.max(equity)
    }
}
