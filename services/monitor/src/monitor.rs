//! Monitor loop
//!
//! One pass per tick: daily reset (at most once a minute) → fallback
//! prices → SL/TP matching → per-account margin guard → per-account
//! drawdown guard. Ticks never overlap; a tick that overruns its period
//! rolls straight into the next one.
//!
//! Every ledger failure inside a tick is logged and skipped; the next tick
//! re-reads the world and retries. Nothing is cached across ticks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use types::account::Account;
use types::ids::AccountId;
use types::position::{CloseReason, Position};

use crate::clock::{now_ms, today_utc};
use crate::closer::PositionCloser;
use crate::daily_reset::DailyResetScheduler;
use crate::drawdown;
use crate::fallback::FallbackLoader;
use crate::ledger::{Ledger, MAX_ORDERS_PER_FETCH, MAX_POSITIONS_PER_FETCH};
use crate::margin::{self, Mark, MarginVerdict};
use crate::price_cache::PriceCache;
use crate::sltp;

/// What one tick did, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sl_tp_closes: usize,
    pub margin_calls: usize,
    pub stop_outs: usize,
    pub breaches: usize,
}

/// The engine's orchestrator.
pub struct Monitor {
    interval: Duration,
    ledger: Arc<dyn Ledger>,
    cache: Arc<PriceCache>,
    closer: PositionCloser,
    fallback: FallbackLoader,
    scheduler: DailyResetScheduler,
}

impl Monitor {
    pub fn new(ledger: Arc<dyn Ledger>, cache: Arc<PriceCache>, interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            closer: PositionCloser::new(ledger.clone()),
            ledger,
            cache,
            fallback: FallbackLoader::new(),
            scheduler: DailyResetScheduler::new(),
        }
    }

    /// Run ticks forever.
    pub async fn run(mut self) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "monitor loop started");
        loop {
            let started = Instant::now();
            let report = self.tick().await;
            if report != TickReport::default() {
                tracing::info!(
                    sl_tp_closes = report.sl_tp_closes,
                    margin_calls = report.margin_calls,
                    stop_outs = report.stop_outs,
                    breaches = report.breaches,
                    "tick enforced"
                );
            }
            // No overlap: an overrunning tick starts the next immediately.
            if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
                tokio::time::sleep(remaining).await;
            }
        }
    }

    /// One full evaluation pass.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let now = now_ms();
        let today = today_utc();

        // 1. Daily reset, at most once a minute.
        if let Err(err) = self.scheduler.run_if_due(self.ledger.as_ref(), now, &today).await {
            tracing::warn!(error = %err, "daily reset pass failed");
        }

        // 2. Fallback prices into the cache.
        if let Err(err) = self.fallback.refresh(self.ledger.as_ref(), &self.cache).await {
            tracing::warn!(error = %err, "fallback price refresh failed");
        }

        // 3. This tick's open positions and pending SL/TP orders.
        let positions = match self.ledger.list_open_positions(MAX_POSITIONS_PER_FETCH).await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::warn!(error = %err, "open-position fetch failed; skipping tick");
                return report;
            }
        };

        // 4. Nothing open: nothing to enforce.
        if positions.is_empty() {
            return report;
        }

        let orders = match self.ledger.list_pending_sl_tp_orders(MAX_ORDERS_PER_FETCH).await {
            Ok(orders) => orders,
            Err(err) => {
                tracing::warn!(error = %err, "sl/tp order fetch failed; skipping matching");
                Vec::new()
            }
        };

        // 5. SL/TP matching against the same tick's position set.
        report.sl_tp_closes =
            sltp::run_matcher(&positions, &orders, &self.cache, &self.closer, now).await;

        // 6. Re-read what survived and group by account.
        let positions = match self.ledger.list_open_positions(MAX_POSITIONS_PER_FETCH).await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::warn!(error = %err, "position re-fetch failed; skipping account checks");
                return report;
            }
        };
        let mut by_account: BTreeMap<AccountId, Vec<Position>> = BTreeMap::new();
        for position in positions {
            by_account.entry(position.account_id).or_default().push(position);
        }
        if by_account.is_empty() {
            return report;
        }

        // 7. Margin then drawdown, independently per account.
        let ids: Vec<AccountId> = by_account.keys().copied().collect();
        let accounts = match self.ledger.list_accounts(&ids).await {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::warn!(error = %err, "account fetch failed; skipping account checks");
                return report;
            }
        };

        for account in accounts {
            if account.is_breached() {
                continue;
            }
            let Some(account_positions) = by_account.get(&account.id) else {
                continue;
            };
            let marks = margin::mark_positions(account_positions, &self.cache, now);

            // No fresh price for any open position: the price of truth is
            // unavailable, so neither guard may act on this account.
            if marks.is_empty() {
                tracing::debug!(
                    account_id = %account.id,
                    positions = account_positions.len(),
                    "all ticks stale; skipping account"
                );
                continue;
            }

            match margin::evaluate(&account, &marks) {
                MarginVerdict::StopOut { victim, margin_level_pct } => {
                    report.stop_outs += 1;
                    tracing::warn!(
                        account_id = %account.id,
                        margin_level_pct = %margin_level_pct,
                        victim = %victim.position.id,
                        "stop-out: closing worst position"
                    );
                    if let Err(err) = self
                        .closer
                        .close(&victim.position, victim.exit_price, CloseReason::Liquidation, None)
                        .await
                    {
                        tracing::warn!(
                            account_id = %account.id,
                            error = %err,
                            "stop-out close failed; re-evaluating next tick"
                        );
                    }
                    // Drawdown waits for the ledger to reflect the close.
                    continue;
                }
                MarginVerdict::MarginCall { margin_level_pct } => {
                    report.margin_calls += 1;
                    tracing::warn!(
                        account_id = %account.id,
                        margin_level_pct = %margin_level_pct,
                        "margin call"
                    );
                }
                MarginVerdict::Healthy => {}
            }

            let equity = margin::equity(&account, &marks);
            if let Some(signal) = drawdown::evaluate(&account, equity, &today) {
                report.breaches += 1;
                self.execute_breach(&account, &marks, &signal.reason).await;
            }
        }

        report
    }

    /// Close every markable position, then mark the account breached.
    async fn execute_breach(&self, account: &Account, marks: &[Mark], reason: &str) {
        tracing::warn!(account_id = %account.id, reason, "drawdown breach: liquidating account");

        for mark in marks {
            if let Err(err) = self
                .closer
                .close(&mark.position, mark.exit_price, CloseReason::Liquidation, None)
                .await
            {
                tracing::warn!(
                    position_id = %mark.position.id,
                    error = %err,
                    "breach close failed"
                );
            }
        }

        if let Err(err) = self.ledger.breach_account_atomic(account.id, reason).await {
            tracing::error!(
                account_id = %account.id,
                error = %err,
                "breach_account_atomic failed; re-evaluating next tick"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use types::account::AccountStatus;
    use types::ids::{PositionId, Symbol};
    use types::position::{Direction, PositionStatus};
    use types::tick::DEFAULT_STALE_MS;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn make_account(starting: &str, net_worth: &str, margin_required: &str) -> Account {
        Account {
            id: AccountId::new(),
            user_id: "user-1".to_string(),
            starting_balance: dec(starting),
            available_margin: dec(net_worth) - dec(margin_required),
            total_margin_required: dec(margin_required),
            net_worth: dec(net_worth),
            realized_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            account_status: AccountStatus::Active,
            breach_reason: None,
            day_start_balance: None,
            day_start_equity: None,
            day_start_date: None,
            current_phase: None,
        }
    }

    fn make_position(account: &Account, symbol: &str, direction: Direction, entry: &str, qty: &str, lev: &str, margin: &str) -> Position {
        Position {
            id: PositionId::new(),
            account_id: account.id,
            symbol: Symbol::new(symbol),
            direction,
            quantity: dec(qty),
            leverage: dec(lev),
            entry_price: dec(entry),
            liquidation_price: None,
            isolated_margin: dec(margin),
            trade_fees: Decimal::ZERO,
            status: PositionStatus::Open,
            close_reason: None,
            exit_price: None,
            exit_timestamp: None,
            realized_pnl: None,
            entry_timestamp: Utc::now(),
            original_quantity: dec(qty),
        }
    }

    fn setup(ledger: Arc<MemoryLedger>) -> (Monitor, Arc<PriceCache>) {
        let cache = Arc::new(PriceCache::new(DEFAULT_STALE_MS));
        let monitor = Monitor::new(ledger, cache.clone(), 1_000);
        (monitor, cache)
    }

    #[tokio::test]
    async fn test_empty_positions_short_circuits_without_writes() {
        let ledger = Arc::new(MemoryLedger::new());
        // An account exists, but with no open positions and a fresh
        // day-start anchor for today
        let mut account = make_account("100000", "100000", "0");
        account.day_start_date = Some(today_utc());
        ledger.insert_account(account);

        let (mut monitor, _cache) = setup(ledger.clone());
        let report = monitor.tick().await;

        assert_eq!(report, TickReport::default());
        assert_eq!(ledger.write_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_out_closes_worst_and_skips_drawdown() {
        let ledger = Arc::new(MemoryLedger::new());
        // Equity 150 over margin 500 → 30%, and equity is also below the
        // absolute drawdown limit; stop-out must still win this tick
        let mut account = make_account("500", "500", "500");
        account.day_start_date = Some(today_utc());
        ledger.insert_account(account.clone());

        let worst = make_position(&account, "BTC-USD", Direction::Long, "1000", "1", "1", "250");
        let mild = make_position(&account, "ETH-USD", Direction::Long, "100", "1", "1", "250");
        ledger.insert_position(worst.clone());
        ledger.insert_position(mild.clone());

        let (mut monitor, cache) = setup(ledger.clone());
        let now = now_ms();
        cache.set(Symbol::new("BTC-USD"), dec("700"), dec("701"), None, now).unwrap();
        cache.set(Symbol::new("ETH-USD"), dec("50"), dec("51"), None, now).unwrap();

        let report = monitor.tick().await;
        assert_eq!(report.stop_outs, 1);
        assert_eq!(report.breaches, 0);

        // Exactly the worst position closed, with reason liquidation
        let worst_after = ledger.position(worst.id).unwrap();
        assert_eq!(worst_after.status, PositionStatus::Closed);
        assert_eq!(worst_after.close_reason, Some(CloseReason::Liquidation));
        assert!(ledger.position(mild.id).unwrap().is_open());

        // Account not breached this tick
        assert!(!ledger.account(account.id).unwrap().is_breached());
    }

    #[tokio::test]
    async fn test_margin_call_changes_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        // Absolute drawdown stays under 10% (490 → 450) while the margin
        // level sits between the call and stop-out thresholds
        let mut account = make_account("490", "450", "500");
        account.day_start_date = Some(today_utc());
        ledger.insert_account(account.clone());
        let position = make_position(&account, "BTC-USD", Direction::Long, "100", "1", "1", "500");
        ledger.insert_position(position.clone());

        let (mut monitor, cache) = setup(ledger.clone());
        cache.set(Symbol::new("BTC-USD"), dec("100"), dec("100"), None, now_ms()).unwrap();

        let report = monitor.tick().await;
        // Equity 450 / margin 500 = 90%: call, no close, no breach
        assert_eq!(report.margin_calls, 1);
        assert_eq!(report.stop_outs, 0);
        assert!(ledger.position(position.id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_absolute_breach_closes_all_and_marks_account() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut account = make_account("100000", "91000", "950");
        account.day_start_date = Some(today_utc());
        ledger.insert_account(account.clone());
        // Unrealized -1500 → equity 89 500 ≤ 90 000
        let position = make_position(&account, "BTC-USD", Direction::Long, "95000", "0.01", "10", "95");
        ledger.insert_position(position.clone());

        let (mut monitor, cache) = setup(ledger.clone());
        cache.set(Symbol::new("BTC-USD"), dec("80000"), dec("80010"), None, now_ms()).unwrap();

        let report = monitor.tick().await;
        assert_eq!(report.breaches, 1);

        let account_after = ledger.account(account.id).unwrap();
        assert!(account_after.is_breached());
        assert!(account_after
            .breach_reason
            .as_deref()
            .unwrap()
            .starts_with("Max drawdown reached"));

        // Zero open positions remain after the breach tick
        assert!(ledger.open_positions_for_account(account.id).is_empty());
        let closed = ledger.position(position.id).unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Liquidation));
    }

    #[tokio::test]
    async fn test_breached_account_never_reexamined() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut account = make_account("100000", "50000", "500");
        account.account_status = AccountStatus::Breached;
        account.breach_reason = Some("earlier".to_string());
        ledger.insert_account(account.clone());
        let position = make_position(&account, "BTC-USD", Direction::Long, "95000", "0.01", "10", "95");
        ledger.insert_position(position.clone());

        let (mut monitor, cache) = setup(ledger.clone());
        cache.set(Symbol::new("BTC-USD"), dec("80000"), dec("80010"), None, now_ms()).unwrap();

        let report = monitor.tick().await;
        assert_eq!(report, TickReport { sl_tp_closes: 0, margin_calls: 0, stop_outs: 0, breaches: 0 });
        assert_eq!(
            ledger.account(account.id).unwrap().breach_reason.as_deref(),
            Some("earlier")
        );
    }

    #[tokio::test]
    async fn test_stale_prices_freeze_enforcement() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut account = make_account("100000", "91000", "950");
        account.day_start_date = Some(today_utc());
        ledger.insert_account(account.clone());
        let position = make_position(&account, "BTC-USD", Direction::Long, "95000", "0.01", "10", "95");
        ledger.insert_position(position.clone());

        let (mut monitor, cache) = setup(ledger.clone());
        // Catastrophic but stale price: must change nothing
        cache
            .set(Symbol::new("BTC-USD"), dec("10000"), dec("10010"), None, now_ms() - 60_000)
            .unwrap();

        let report = monitor.tick().await;
        assert_eq!(report.breaches, 0);
        assert_eq!(report.stop_outs, 0);
        assert!(ledger.position(position.id).unwrap().is_open());
        assert!(!ledger.account(account.id).unwrap().is_breached());
    }
}
