//! Health endpoint and engine stats
//!
//! A tiny read-only HTTP surface for the hosting platform's liveness
//! checks. It reports, never controls: the monitor loop does not depend on
//! it, and it holds no locks across awaits.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

use crate::clock::now_ms;
use crate::price_cache::PriceCache;

/// Shared counters the feed client and health endpoint communicate
/// through.
#[derive(Debug)]
pub struct EngineStats {
    started: Instant,
    feed_connected: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            feed_connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn set_feed_connected(&self, connected: bool) {
        self.feed_connected.store(connected, Ordering::Relaxed);
    }

    pub fn feed_connected(&self) -> bool {
        self.feed_connected.load(Ordering::Relaxed)
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset_reconnect_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the health routes.
#[derive(Clone)]
pub struct HealthState {
    pub stats: Arc<EngineStats>,
    pub cache: Arc<PriceCache>,
}

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub feed_connected: bool,
    pub price_cache_size: usize,
    pub fresh_prices: usize,
    pub reconnect_attempts: u32,
    pub timestamp: i64,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let now = now_ms();
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.stats.uptime_seconds(),
        feed_connected: state.stats.feed_connected(),
        price_cache_size: state.cache.len(),
        fresh_prices: state.cache.fresh_count(now),
        reconnect_attempts: state.stats.reconnect_attempts(),
        timestamp: now,
    })
}

/// Build the health router: `/` and `/health` answer, everything else 404.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the health endpoint until the process exits.
pub async fn serve(state: HealthState, port: u16) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "health endpoint listening");
    axum::serve(listener, router(state)).await
}
