//! HTTP implementation of the ledger gateway
//!
//! Speaks the ledger's REST surface: row reads under `/rest/v1/<table>`
//! with PostgREST-style filters, and the atomic procedures under
//! `/rest/v1/rpc/<name>`. Authenticates with the server-side service key.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::account::Account;
use types::ids::{AccountId, Symbol};
use types::order::Order;
use types::position::Position;

use super::{
    ClosePositionParams, Ledger, LedgerError, PlaceMarketOrderParams, PriceRow,
    MAX_DAY_START_ACCOUNTS_PER_FETCH, MAX_ORDERS_PER_FETCH, MAX_POSITIONS_PER_FETCH,
};

/// Request timeout for every ledger call. A slow ledger must never wedge
/// the tick; the caller logs and retries next tick.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the RPC surface.
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: Option<String>,
    details: Option<String>,
}

/// Ledger gateway over HTTP.
pub struct HttpLedger {
    client: Client,
    base_url: String,
}

impl HttpLedger {
    /// Build a gateway for the given base URL and service key.
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, LedgerError> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(service_key)
            .map_err(|e| LedgerError::Transport(format!("invalid service key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|e| LedgerError::Transport(format!("invalid service key: {e}")))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn rest_url(&self, path_and_query: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path_and_query)
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<Vec<T>, LedgerError> {
        let response = self
            .client
            .get(self.rest_url(path_and_query))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "read failed with status {}",
                response.status()
            )));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn call_rpc<P: Serialize>(
        &self,
        rpc: &str,
        params: &P,
    ) -> Result<reqwest::Response, LedgerError> {
        let response = self
            .client
            .post(self.rest_url(&format!("rpc/{rpc}")))
            .json(params)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .json::<RpcErrorBody>()
            .await
            .unwrap_or(RpcErrorBody { message: None, details: None });
        Err(classify_rpc_error(rpc, status, body))
    }
}

/// Map a failed RPC response onto the engine's error taxonomy.
///
/// The procedures raise with well-known message prefixes; anything else is
/// treated as transient and retried next tick.
fn classify_rpc_error(rpc: &str, status: StatusCode, body: RpcErrorBody) -> LedgerError {
    let message = body.message.unwrap_or_else(|| status.to_string());
    let lower = message.to_lowercase();

    if lower.contains("not_open") || lower.contains("not open") {
        return LedgerError::NotOpen;
    }
    if lower.contains("account_not_found") || lower.contains("account not found") {
        return LedgerError::AccountNotFound;
    }
    if lower.contains("insufficient_margin") || lower.contains("insufficient margin") {
        let details = body.details.unwrap_or_else(|| "unknown".to_string());
        return LedgerError::InsufficientMargin {
            required: details.clone(),
            available: details,
        };
    }
    LedgerError::Rpc {
        rpc: rpc.to_string(),
        message,
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn list_open_positions(&self, limit: usize) -> Result<Vec<Position>, LedgerError> {
        let limit = limit.min(MAX_POSITIONS_PER_FETCH);
        self.get_rows(&format!(
            "positions?select=*&status=eq.open&order=id.asc&limit={limit}"
        ))
        .await
    }

    async fn list_pending_sl_tp_orders(&self, limit: usize) -> Result<Vec<Order>, LedgerError> {
        let limit = limit.min(MAX_ORDERS_PER_FETCH);
        self.get_rows(&format!(
            "orders?select=*&status=eq.pending&position_id=not.is.null&order=id.asc&limit={limit}"
        ))
        .await
    }

    async fn list_accounts(&self, ids: &[AccountId]) -> Result<Vec<Account>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.get_rows(&format!("accounts?select=*&id=in.({joined})"))
            .await
    }

    async fn list_active_accounts_with_stale_day_start(
        &self,
        today_utc: &str,
        limit: usize,
    ) -> Result<Vec<Account>, LedgerError> {
        let limit = limit.min(MAX_DAY_START_ACCOUNTS_PER_FETCH);
        self.get_rows(&format!(
            "accounts?select=*&account_status=in.(active,funded)\
             &or=(day_start_date.is.null,day_start_date.neq.{today_utc})&limit={limit}"
        ))
        .await
    }

    async fn snapshot_day_start(
        &self,
        account_id: AccountId,
        equity: Decimal,
        today_utc: &str,
    ) -> Result<(), LedgerError> {
        // The day_start_date guard in the filter makes concurrent runs
        // idempotent: a second writer matches zero rows.
        let response = self
            .client
            .patch(self.rest_url(&format!(
                "accounts?id=eq.{account_id}\
                 &or=(day_start_date.is.null,day_start_date.neq.{today_utc})"
            )))
            .json(&serde_json::json!({
                "day_start_balance": equity,
                "day_start_equity": equity,
                "day_start_date": today_utc,
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "day-start snapshot failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_price_rows(&self, symbols: &[Symbol]) -> Result<Vec<PriceRow>, LedgerError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let joined = symbols
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.get_rows(&format!("price_cache?select=*&symbol=in.({joined})"))
            .await
    }

    async fn place_market_order(
        &self,
        params: PlaceMarketOrderParams,
    ) -> Result<Position, LedgerError> {
        let response = self.call_rpc("place_market_order", &params).await?;
        response
            .json::<Position>()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn close_position_atomic(
        &self,
        params: ClosePositionParams,
    ) -> Result<(), LedgerError> {
        self.call_rpc("close_position_atomic", &params).await?;
        Ok(())
    }

    async fn breach_account_atomic(
        &self,
        account_id: AccountId,
        reason: &str,
    ) -> Result<(), LedgerError> {
        #[derive(Serialize)]
        struct BreachParams<'a> {
            p_account_id: AccountId,
            p_reason: &'a str,
            p_ts: chrono::DateTime<Utc>,
        }
        self.call_rpc(
            "breach_account_atomic",
            &BreachParams {
                p_account_id: account_id,
                p_reason: reason,
                p_ts: Utc::now(),
            },
        )
        .await?;
        Ok(())
    }
}
