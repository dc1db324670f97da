//! In-memory implementation of the ledger gateway
//!
//! Encodes the transactional semantics of the three atomic procedures with
//! a single process-wide lock standing in for the account-row write lock:
//! every mutating call observes and produces fully consistent state, and
//! concurrent callers are linearized exactly as the relational procedures
//! linearize on `SELECT … FOR UPDATE`.
//!
//! Serves as the executable contract for the procedures and as the test
//! double for the whole engine.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Mutex;
use types::account::{Account, AccountStatus};
use types::activity::{Activity, EquityPoint};
use types::ids::{AccountId, OrderId, PositionId, Symbol};
use types::order::{Order, OrderStatus, OrderType};
use types::position::{Position, PositionStatus};

use super::{
    ClosePositionParams, Ledger, LedgerError, PlaceMarketOrderParams, PriceRow,
    MAX_DAY_START_ACCOUNTS_PER_FETCH, MAX_ORDERS_PER_FETCH, MAX_POSITIONS_PER_FETCH,
};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<AccountId, Account>,
    positions: BTreeMap<PositionId, Position>,
    orders: BTreeMap<OrderId, Order>,
    activity: Vec<Activity>,
    equity_history: Vec<EquityPoint>,
    price_rows: BTreeMap<Symbol, PriceRow>,
    /// Mutating RPC calls that changed state. Reads never count.
    write_count: u64,
}

/// In-memory ledger with atomic-procedure semantics.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Test-support setup and inspection ────────────────────────────────

    pub fn insert_account(&self, account: Account) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(account.id, account);
    }

    pub fn insert_position(&self, position: Position) {
        let mut state = self.state.lock().unwrap();
        state.positions.insert(position.id, position);
    }

    pub fn insert_order(&self, order: Order) {
        let mut state = self.state.lock().unwrap();
        state.orders.insert(order.id, order);
    }

    pub fn upsert_price_row(&self, row: PriceRow) {
        let mut state = self.state.lock().unwrap();
        state.price_rows.insert(row.symbol.clone(), row);
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn position(&self, id: PositionId) -> Option<Position> {
        self.state.lock().unwrap().positions.get(&id).cloned()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.lock().unwrap().orders.get(&id).cloned()
    }

    pub fn orders_for_position(&self, position_id: PositionId) -> Vec<Order> {
        self.state
            .lock()
            .unwrap()
            .orders
            .values()
            .filter(|o| o.position_id == Some(position_id))
            .cloned()
            .collect()
    }

    pub fn open_positions_for_account(&self, account_id: AccountId) -> Vec<Position> {
        self.state
            .lock()
            .unwrap()
            .positions
            .values()
            .filter(|p| p.account_id == account_id && p.is_open())
            .cloned()
            .collect()
    }

    pub fn activity_log(&self) -> Vec<Activity> {
        self.state.lock().unwrap().activity.clone()
    }

    pub fn equity_history(&self) -> Vec<EquityPoint> {
        self.state.lock().unwrap().equity_history.clone()
    }

    /// Number of state-changing RPC calls observed.
    pub fn write_count(&self) -> u64 {
        self.state.lock().unwrap().write_count
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn list_open_positions(&self, limit: usize) -> Result<Vec<Position>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions
            .values()
            .filter(|p| p.is_open())
            .take(limit.min(MAX_POSITIONS_PER_FETCH))
            .cloned()
            .collect())
    }

    async fn list_pending_sl_tp_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .values()
            .filter(|o| o.is_pending_sl_tp())
            .take(limit.min(MAX_ORDERS_PER_FETCH))
            .cloned()
            .collect())
    }

    async fn list_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect())
    }

    async fn list_active_accounts_with_stale_day_start(
        &self,
        today_utc: &str,
        limit: usize,
    ) -> Result<Vec<Account>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .filter(|a| a.is_active())
            .filter(|a| a.day_start_date.as_deref() != Some(today_utc))
            .take(limit.min(MAX_DAY_START_ACCOUNTS_PER_FETCH))
            .cloned()
            .collect())
    }

    async fn snapshot_day_start(
        &self,
        account_id: AccountId,
        equity: Decimal,
        today_utc: &str,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound)?;

        // Idempotence: a snapshot for today already exists, do nothing.
        if account.day_start_date.as_deref() == Some(today_utc) {
            return Ok(());
        }

        account.day_start_balance = Some(equity);
        account.day_start_equity = Some(equity);
        account.day_start_date = Some(today_utc.to_string());
        state.write_count += 1;
        Ok(())
    }

    async fn fetch_price_rows(&self, symbols: &[Symbol]) -> Result<Vec<PriceRow>, LedgerError> {
        let state = self.state.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| state.price_rows.get(s).cloned())
            .collect())
    }

    async fn place_market_order(
        &self,
        params: PlaceMarketOrderParams,
    ) -> Result<Position, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let account = state
            .accounts
            .get(&params.account_id)
            .ok_or(LedgerError::AccountNotFound)?;
        if !account.is_active() {
            return Err(LedgerError::AccountNotFound);
        }
        if params.margin > account.available_margin {
            return Err(LedgerError::InsufficientMargin {
                required: params.margin.to_string(),
                available: account.available_margin.to_string(),
            });
        }

        let position = Position {
            id: PositionId::new(),
            account_id: params.account_id,
            symbol: params.symbol.clone(),
            direction: params.direction,
            quantity: params.quantity,
            leverage: params.leverage,
            entry_price: params.exec_price,
            liquidation_price: params.liquidation_price,
            isolated_margin: params.margin,
            trade_fees: params.fee,
            status: PositionStatus::Open,
            close_reason: None,
            exit_price: None,
            exit_timestamp: None,
            realized_pnl: None,
            entry_timestamp: now,
            original_quantity: params.quantity,
        };
        state.positions.insert(position.id, position.clone());

        if let Some(stop_price) = params.sl_price {
            let order = Order {
                id: OrderId::new(),
                account_id: params.account_id,
                position_id: Some(position.id),
                symbol: params.symbol.clone(),
                order_type: OrderType::Stop,
                direction: params.direction.opposite(),
                quantity: params.quantity,
                leverage: params.leverage,
                price: None,
                stop_price: Some(stop_price),
                status: OrderStatus::Pending,
                filled_quantity: Decimal::ZERO,
            };
            state.orders.insert(order.id, order);
        }
        if let Some(price) = params.tp_price {
            let order = Order {
                id: OrderId::new(),
                account_id: params.account_id,
                position_id: Some(position.id),
                symbol: params.symbol.clone(),
                order_type: OrderType::Limit,
                direction: params.direction.opposite(),
                quantity: params.quantity,
                leverage: params.leverage,
                price: Some(price),
                stop_price: None,
                status: OrderStatus::Pending,
                filled_quantity: Decimal::ZERO,
            };
            state.orders.insert(order.id, order);
        }

        let account = state.accounts.get_mut(&params.account_id).unwrap();
        account.available_margin -= params.margin;
        account.total_margin_required += params.margin;
        account.net_worth -= params.fee;
        let equity = account.net_worth;
        let account_id = account.id;

        state.activity.push(Activity::new(
            account_id,
            "position_opened",
            format!("Opened {} {}", params.symbol, params.direction.as_str()),
            format!("{} @ {}", params.quantity, params.exec_price),
            now,
            None,
        ));
        state.equity_history.push(EquityPoint {
            account_id,
            ts: now,
            equity,
            pnl: Decimal::ZERO,
        });
        state.write_count += 1;

        Ok(position)
    }

    async fn close_position_atomic(
        &self,
        params: ClosePositionParams,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();

        // Validate everything before the first mutation: a real procedure
        // rolls back on failure, so no partial state may escape here either.
        let position = state
            .positions
            .get(&params.position_id)
            .ok_or(LedgerError::NotOpen)?;
        if !position.is_open() {
            return Err(LedgerError::NotOpen);
        }
        if !state.accounts.contains_key(&params.account_id) {
            return Err(LedgerError::AccountNotFound);
        }

        // Position row
        let position = state.positions.get_mut(&params.position_id).unwrap();
        position.status = PositionStatus::Closed;
        position.close_reason = Some(params.close_reason);
        position.exit_price = Some(params.exit_price);
        position.exit_timestamp = Some(params.exit_timestamp);
        position.realized_pnl = Some(params.realized_pnl);
        position.trade_fees = params.existing_fees + params.close_fee;

        // Linked orders: cancel every still-pending one; the triggering
        // order (if any) fills at the full close quantity instead.
        let linked: Vec<OrderId> = state
            .orders
            .values()
            .filter(|o| o.position_id == Some(params.position_id))
            .filter(|o| o.status == OrderStatus::Pending)
            .map(|o| o.id)
            .collect();
        for order_id in linked {
            let order = state.orders.get_mut(&order_id).unwrap();
            if Some(order_id) == params.triggered_order_id {
                order.status = OrderStatus::Filled;
                order.filled_quantity = params.quantity;
            } else {
                order.status = OrderStatus::Cancelled;
            }
        }

        // Account row
        let account = state.accounts.get_mut(&params.account_id).unwrap();
        account.available_margin +=
            params.isolated_margin + params.realized_pnl - params.close_fee;
        account.total_margin_required =
            (account.total_margin_required - params.isolated_margin).max(Decimal::ZERO);
        account.realized_pnl += params.realized_pnl;
        account.total_pnl += params.realized_pnl;
        account.net_worth += params.realized_pnl - params.close_fee;
        let equity = account.net_worth;
        let account_id = account.id;

        state.equity_history.push(EquityPoint {
            account_id,
            ts: params.exit_timestamp,
            equity,
            pnl: params.realized_pnl,
        });
        state.activity.push(Activity::new(
            account_id,
            "position_closed",
            format!("Closed {} {}", params.symbol, params.direction.as_str()),
            format!("{} @ {}", params.close_reason.as_str(), params.exit_price),
            params.exit_timestamp,
            Some(params.realized_pnl),
        ));
        state.write_count += 1;

        Ok(())
    }

    async fn breach_account_atomic(
        &self,
        account_id: AccountId,
        reason: &str,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound)?;

        // Already terminal: keep the first breach reason.
        if account.account_status == AccountStatus::Breached {
            return Ok(());
        }

        account.account_status = AccountStatus::Breached;
        account.breach_reason = Some(reason.to_string());

        state.activity.push(Activity::new(
            account_id,
            "account_breached",
            "Account breached".to_string(),
            reason.to_string(),
            Utc::now(),
            None,
        ));
        state.write_count += 1;
        Ok(())
    }
}
