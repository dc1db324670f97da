//! Append-only audit and equity-history rows
//!
//! Every close and breach appends an activity entry; every close also
//! appends an equity-history point.

use crate::ids::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit entry for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub account_id: AccountId,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub title: String,
    pub sub: String,
    pub ts: DateTime<Utc>,
    pub pnl: Option<Decimal>,
}

impl Activity {
    pub fn new(
        account_id: AccountId,
        activity_type: impl Into<String>,
        title: impl Into<String>,
        sub: impl Into<String>,
        ts: DateTime<Utc>,
        pnl: Option<Decimal>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            activity_type: activity_type.into(),
            title: title.into(),
            sub: sub.into(),
            ts,
            pnl,
        }
    }
}

/// One equity observation written at every close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub account_id: AccountId,
    pub ts: DateTime<Utc>,
    pub equity: Decimal,
    pub pnl: Decimal,
}
