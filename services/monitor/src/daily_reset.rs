//! Daily-reset scheduler
//!
//! Snapshots each active account's daily-drawdown anchor once per UTC day,
//! without an external cron: the loop simply notices "day_start_date is
//! not today" and writes the snapshot. The ledger-side date guard keeps
//! concurrent runs and restarts from double-snapshotting a day.

use crate::ledger::{Ledger, LedgerError, MAX_DAY_START_ACCOUNTS_PER_FETCH};

/// Minimum wall-clock gap between reset passes.
pub const MIN_PASS_INTERVAL_MS: i64 = 60_000;

/// Gates day-start snapshot passes to once per minute.
#[derive(Debug)]
pub struct DailyResetScheduler {
    last_pass_ms: Option<i64>,
}

impl DailyResetScheduler {
    pub fn new() -> Self {
        Self { last_pass_ms: None }
    }

    /// Whether a pass is due at `now_ms`.
    pub fn due(&self, now_ms: i64) -> bool {
        match self.last_pass_ms {
            None => true,
            Some(last) => now_ms - last >= MIN_PASS_INTERVAL_MS,
        }
    }

    /// Run a snapshot pass if one is due. Returns the number of accounts
    /// snapshotted.
    ///
    /// The anchor is the account's realized net worth; the unrealized PnL
    /// of open positions is settled into it only at closes, so this is the
    /// conservative midnight equity.
    pub async fn run_if_due(
        &mut self,
        ledger: &dyn Ledger,
        now_ms: i64,
        today_utc: &str,
    ) -> Result<usize, LedgerError> {
        if !self.due(now_ms) {
            return Ok(0);
        }
        // Mark the pass before any ledger call so a failing ledger does
        // not turn the gate into a hot loop.
        self.last_pass_ms = Some(now_ms);

        let due_accounts = ledger
            .list_active_accounts_with_stale_day_start(today_utc, MAX_DAY_START_ACCOUNTS_PER_FETCH)
            .await?;

        let mut snapshotted = 0;
        for account in due_accounts {
            match ledger
                .snapshot_day_start(account.id, account.net_worth, today_utc)
                .await
            {
                Ok(()) => {
                    snapshotted += 1;
                    tracing::info!(
                        account_id = %account.id,
                        anchor = %account.net_worth,
                        day = today_utc,
                        "day-start anchor snapshotted"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        account_id = %account.id,
                        error = %err,
                        "day-start snapshot failed; retrying next pass"
                    );
                }
            }
        }
        Ok(snapshotted)
    }
}

impl Default for DailyResetScheduler {
    fn default() -> Self {
        Self::new()
    }
}
