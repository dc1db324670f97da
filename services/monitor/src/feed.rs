//! Exchange feed client
//!
//! Holds exactly one live book-ticker stream for the fixed crypto symbol
//! set, remaps exchange symbols into platform symbols, and writes every
//! valid frame into the price cache stamped with the arrival time.
//!
//! Disconnects never crash the process: the client reconnects forever with
//! exponential backoff (1s, 2s, 4s, … capped at 30s) and resets the
//! attempt counter on a successful open. Unknown symbols and malformed
//! frames are dropped without log spam.

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use types::ids::Symbol;

use crate::clock::now_ms;
use crate::health::EngineStats;
use crate::price_cache::PriceCache;

/// Exchange symbol → platform symbol for the streamed crypto set.
pub const SYMBOL_MAP: &[(&str, &str)] = &[
    ("BTCUSDT", "BTC-USD"),
    ("ETHUSDT", "ETH-USD"),
    ("SOLUSDT", "SOL-USD"),
    ("XRPUSDT", "XRP-USD"),
    ("BNBUSDT", "BNB-USD"),
    ("DOGEUSDT", "DOGE-USD"),
    ("ADAUSDT", "ADA-USD"),
    ("LTCUSDT", "LTC-USD"),
];

/// Maximum reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Translate an exchange symbol to its platform symbol.
pub fn map_symbol(external: &str) -> Option<Symbol> {
    SYMBOL_MAP
        .iter()
        .find(|(ext, _)| *ext == external)
        .map(|(_, platform)| Symbol::new(*platform))
}

/// Reconnect delay for the given attempt count: `min(1s × 2^attempts, 30s)`.
pub fn backoff_delay(attempts: u32) -> Duration {
    let secs = 1u64 << attempts.min(5);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// Multiplexed stream URL subscribing every mapped symbol by path.
pub fn stream_url(base: &str) -> String {
    let streams = SYMBOL_MAP
        .iter()
        .map(|(ext, _)| format!("{}@bookTicker", ext.to_lowercase()))
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/stream?streams={}", base.trim_end_matches('/'), streams)
}

/// Best-bid/best-ask payload of one book-ticker frame.
#[derive(Debug, Deserialize)]
struct BookTickerData {
    s: String,
    b: String,
    a: String,
}

/// Combined-stream envelope wrapping the payload.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    data: BookTickerData,
}

/// Parse a frame into `(external_symbol, bid, ask)`.
///
/// Accepts the enveloped and the bare payload shape; anything else is
/// dropped.
pub fn parse_frame(text: &str) -> Option<(String, Decimal, Decimal)> {
    let data = match serde_json::from_str::<StreamEnvelope>(text) {
        Ok(envelope) => envelope.data,
        Err(_) => serde_json::from_str::<BookTickerData>(text).ok()?,
    };
    let bid = Decimal::from_str_exact(&data.b).ok()?;
    let ask = Decimal::from_str_exact(&data.a).ok()?;
    Some((data.s, bid, ask))
}

/// Streaming feed client owning the single live connection.
pub struct FeedClient {
    url: String,
    cache: Arc<PriceCache>,
    stats: Arc<EngineStats>,
}

impl FeedClient {
    pub fn new(feed_base_url: &str, cache: Arc<PriceCache>, stats: Arc<EngineStats>) -> Self {
        Self {
            url: stream_url(feed_base_url),
            cache,
            stats,
        }
    }

    /// Apply one text frame to the price cache. Returns whether a symbol
    /// was updated.
    fn apply_frame(&self, text: &str) -> bool {
        let Some((external, bid, ask)) = parse_frame(text) else {
            return false;
        };
        let Some(symbol) = map_symbol(&external) else {
            // Not a platform symbol; drop silently
            return false;
        };
        self.cache
            .set(symbol, bid, ask, None, now_ms())
            .is_ok()
    }

    /// Run forever: connect, consume, reconnect with backoff.
    pub async fn run(self) {
        let mut attempts: u32 = 0;
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    attempts = 0;
                    self.stats.reset_reconnect_attempts();
                    self.stats.set_feed_connected(true);
                    tracing::info!(url = %self.url, "feed connected");

                    let (mut write, mut read) = stream.split();
                    while let Some(message) = read.next().await {
                        match message {
                            Ok(Message::Text(text)) => {
                                self.apply_frame(&text);
                            }
                            Ok(Message::Ping(payload)) => {
                                if write.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "feed read error");
                                break;
                            }
                        }
                    }
                    self.stats.set_feed_connected(false);
                    tracing::warn!("feed disconnected");
                }
                Err(err) => {
                    self.stats.set_feed_connected(false);
                    tracing::warn!(error = %err, "feed connect failed");
                }
            }

            let delay = backoff_delay(attempts);
            attempts = attempts.saturating_add(1);
            self.stats.record_reconnect_attempt();
            tracing::info!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "feed reconnecting"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::tick::DEFAULT_STALE_MS;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    // ── backoff tests ──

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_caps_at_30s() {
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(30));
    }

    // ── symbol mapping tests ──

    #[test]
    fn test_map_known_symbol() {
        assert_eq!(map_symbol("BTCUSDT"), Some(Symbol::new("BTC-USD")));
        assert_eq!(map_symbol("ETHUSDT"), Some(Symbol::new("ETH-USD")));
    }

    #[test]
    fn test_map_unknown_symbol_dropped() {
        assert_eq!(map_symbol("SHIBUSDT"), None);
        assert_eq!(map_symbol(""), None);
    }

    #[test]
    fn test_stream_url_embeds_subscriptions() {
        let url = stream_url("wss://feed.example.com/");
        assert!(url.starts_with("wss://feed.example.com/stream?streams="));
        assert!(url.contains("btcusdt@bookTicker"));
        assert!(url.contains("ltcusdt@bookTicker"));
    }

    // ── frame parsing tests ──

    #[test]
    fn test_parse_enveloped_frame() {
        let text = r#"{"stream":"btcusdt@bookTicker","data":{"s":"BTCUSDT","b":"98820.10","a":"98830.50"}}"#;
        let (symbol, bid, ask) = parse_frame(text).unwrap();
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(bid, dec("98820.10"));
        assert_eq!(ask, dec("98830.50"));
    }

    #[test]
    fn test_parse_bare_frame() {
        let text = r#"{"s":"ETHUSDT","b":"3520.00","a":"3520.10"}"#;
        let (symbol, bid, ask) = parse_frame(text).unwrap();
        assert_eq!(symbol, "ETHUSDT");
        assert_eq!(bid, dec("3520.00"));
        assert_eq!(ask, dec("3520.10"));
    }

    #[test]
    fn test_parse_invalid_frames_dropped() {
        assert!(parse_frame("not json").is_none());
        assert!(parse_frame(r#"{"s":"BTCUSDT"}"#).is_none());
        assert!(parse_frame(r#"{"s":"BTCUSDT","b":"abc","a":"1"}"#).is_none());
        assert!(parse_frame("{}").is_none());
    }

    // ── apply_frame tests ──

    fn make_client(cache: Arc<PriceCache>) -> FeedClient {
        FeedClient::new(
            "wss://feed.example.com",
            cache,
            Arc::new(EngineStats::new()),
        )
    }

    #[test]
    fn test_apply_frame_writes_cache_with_fresh_timestamp() {
        let cache = Arc::new(PriceCache::new(DEFAULT_STALE_MS));
        let client = make_client(cache.clone());

        let applied = client
            .apply_frame(r#"{"s":"BTCUSDT","b":"98820.10","a":"98830.50"}"#);
        assert!(applied);

        let tick = cache.get(&Symbol::new("BTC-USD")).unwrap();
        assert_eq!(tick.bid, dec("98820.10"));
        assert!(cache.is_fresh(&tick, now_ms()));
    }

    #[test]
    fn test_apply_frame_drops_unknown_symbol() {
        let cache = Arc::new(PriceCache::new(DEFAULT_STALE_MS));
        let client = make_client(cache.clone());

        let applied = client.apply_frame(r#"{"s":"SHIBUSDT","b":"1","a":"2"}"#);
        assert!(!applied);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_apply_frame_drops_inverted_market() {
        let cache = Arc::new(PriceCache::new(DEFAULT_STALE_MS));
        let client = make_client(cache.clone());

        let applied = client.apply_frame(r#"{"s":"BTCUSDT","b":"100","a":"99"}"#);
        assert!(!applied);
        assert!(cache.is_empty());
    }
}
