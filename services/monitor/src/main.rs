use std::sync::Arc;

use monitor::config::Config;
use monitor::feed::FeedClient;
use monitor::health::{self, EngineStats, HealthState};
use monitor::ledger::{HttpLedger, Ledger};
use monitor::monitor::Monitor;
use monitor::price_cache::PriceCache;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Startup failures exit non-zero; everything after this retries forever.
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        interval_ms = config.monitor_interval_ms,
        stale_ms = config.price_stale_ms,
        "starting monitor service"
    );

    let cache = Arc::new(PriceCache::new(config.price_stale_ms));
    let stats = Arc::new(EngineStats::new());
    let ledger: Arc<dyn Ledger> =
        Arc::new(HttpLedger::new(&config.ledger_url, &config.ledger_service_key)?);

    // Feed reader: writes the cache, reconnects forever.
    let feed = FeedClient::new(&config.feed_url, cache.clone(), stats.clone());
    tokio::spawn(feed.run());

    // Health endpoint: never blocks the loop.
    let health_state = HealthState {
        stats: stats.clone(),
        cache: cache.clone(),
    };
    let port = config.port;
    tokio::spawn(async move {
        if let Err(err) = health::serve(health_state, port).await {
            tracing::error!(error = %err, "health endpoint failed");
        }
    });

    // Monitor loop until a shutdown signal arrives; dropping the runtime
    // closes the feed socket.
    let engine = Monitor::new(ledger, cache, config.monitor_interval_ms);
    tokio::select! {
        _ = engine.run() => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received; exiting");
        }
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
