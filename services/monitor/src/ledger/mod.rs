//! Ledger gateway
//!
//! The ledger is the only authoritative store of accounts, positions and
//! orders. Every mutation goes through a named atomic RPC that takes a
//! row-level write lock on the account, which is the single point of
//! serialization between the engine's force-closes and user-initiated
//! order flow. The engine never composes multiple writes outside an RPC.

mod http;
mod memory;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::account::Account;
use types::ids::{AccountId, OrderId, PositionId, Symbol};
use types::order::Order;
use types::position::{CloseReason, Direction, Position};

/// Hard caps on read batch sizes.
pub const MAX_POSITIONS_PER_FETCH: usize = 500;
pub const MAX_ORDERS_PER_FETCH: usize = 1_000;
pub const MAX_DAY_START_ACCOUNTS_PER_FETCH: usize = 100;

/// Errors surfaced by the ledger gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The position was already closed by another path; benign race.
    #[error("position is not open")]
    NotOpen,

    /// The account is missing, inactive, or breached.
    #[error("account not found")]
    AccountNotFound,

    /// Requested margin exceeds the account's available margin.
    #[error("insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: String, available: String },

    /// Transport-level failure (connection, timeout, serialization).
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The RPC itself rejected the call for another reason.
    #[error("ledger rpc {rpc} failed: {message}")]
    Rpc { rpc: String, message: String },
}

impl LedgerError {
    /// Whether this error is the benign already-closed race.
    pub fn is_benign_close_race(&self) -> bool {
        matches!(self, LedgerError::NotOpen)
    }

    /// Whether the affected account should simply be retried next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_) | LedgerError::Rpc { .. })
    }
}

/// One row of the ledger's `price_cache` table (read-only source for
/// symbols not available on the streaming feed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub symbol: Symbol,
    pub current_price: Decimal,
    pub current_bid: Option<Decimal>,
    pub current_ask: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

/// Parameters for the `place_market_order` atomic RPC.
///
/// Field names mirror the procedure's `p_`-prefixed wire parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceMarketOrderParams {
    #[serde(rename = "p_account_id")]
    pub account_id: AccountId,
    #[serde(rename = "p_user_id")]
    pub user_id: String,
    #[serde(rename = "p_symbol")]
    pub symbol: Symbol,
    #[serde(rename = "p_direction")]
    pub direction: Direction,
    #[serde(rename = "p_margin_mode")]
    pub margin_mode: String,
    #[serde(rename = "p_quantity")]
    pub quantity: Decimal,
    #[serde(rename = "p_leverage")]
    pub leverage: Decimal,
    #[serde(rename = "p_exec_price")]
    pub exec_price: Decimal,
    #[serde(rename = "p_margin")]
    pub margin: Decimal,
    #[serde(rename = "p_fee")]
    pub fee: Decimal,
    #[serde(rename = "p_liquidation_price")]
    pub liquidation_price: Option<Decimal>,
    #[serde(rename = "p_instrument_config")]
    pub instrument_config: serde_json::Value,
    #[serde(rename = "p_instrument_price")]
    pub instrument_price: Decimal,
    #[serde(rename = "p_sl_price", skip_serializing_if = "Option::is_none")]
    pub sl_price: Option<Decimal>,
    #[serde(rename = "p_tp_price", skip_serializing_if = "Option::is_none")]
    pub tp_price: Option<Decimal>,
}

/// Parameters for the `close_position_atomic` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosePositionParams {
    #[serde(rename = "p_position_id")]
    pub position_id: PositionId,
    #[serde(rename = "p_account_id")]
    pub account_id: AccountId,
    #[serde(rename = "p_exit_price")]
    pub exit_price: Decimal,
    #[serde(rename = "p_exit_timestamp")]
    pub exit_timestamp: DateTime<Utc>,
    #[serde(rename = "p_realized_pnl")]
    pub realized_pnl: Decimal,
    #[serde(rename = "p_close_fee")]
    pub close_fee: Decimal,
    #[serde(rename = "p_existing_fees")]
    pub existing_fees: Decimal,
    #[serde(rename = "p_isolated_margin")]
    pub isolated_margin: Decimal,
    #[serde(rename = "p_close_reason")]
    pub close_reason: CloseReason,
    #[serde(rename = "p_triggered_order_id", skip_serializing_if = "Option::is_none")]
    pub triggered_order_id: Option<OrderId>,
    #[serde(rename = "p_symbol")]
    pub symbol: Symbol,
    #[serde(rename = "p_direction")]
    pub direction: Direction,
    #[serde(rename = "p_quantity")]
    pub quantity: Decimal,
}

/// Read/write port to the relational store.
///
/// Implementations must guarantee that each mutating call runs as a single
/// transaction under a write lock on the account row.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All open positions, up to `limit` (≤ 500).
    async fn list_open_positions(&self, limit: usize) -> Result<Vec<Position>, LedgerError>;

    /// Pending orders linked to a position (SL/TP), up to `limit` (≤ 1000).
    async fn list_pending_sl_tp_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError>;

    /// The accounts with the given ids.
    async fn list_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError>;

    /// Active accounts whose day-start anchor is missing or from a prior
    /// UTC day, up to `limit` (≤ 100).
    async fn list_active_accounts_with_stale_day_start(
        &self,
        today_utc: &str,
        limit: usize,
    ) -> Result<Vec<Account>, LedgerError>;

    /// Snapshot the daily-drawdown anchor for an account.
    async fn snapshot_day_start(
        &self,
        account_id: AccountId,
        equity: Decimal,
        today_utc: &str,
    ) -> Result<(), LedgerError>;

    /// Rows of the `price_cache` table for the given symbols.
    async fn fetch_price_rows(&self, symbols: &[Symbol]) -> Result<Vec<PriceRow>, LedgerError>;

    /// Open a position atomically. Used by the order-entry path; the
    /// engine only relies on the invariants this establishes.
    async fn place_market_order(
        &self,
        params: PlaceMarketOrderParams,
    ) -> Result<Position, LedgerError>;

    /// Close a position atomically. Rejects `NotOpen` when the position
    /// was already closed by another path.
    async fn close_position_atomic(&self, params: ClosePositionParams)
        -> Result<(), LedgerError>;

    /// Mark an account breached atomically.
    async fn breach_account_atomic(
        &self,
        account_id: AccountId,
        reason: &str,
    ) -> Result<(), LedgerError>;
}
