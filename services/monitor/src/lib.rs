//! Monitor service
//!
//! The platform's 24/7 execution and risk-enforcement engine. Watches every
//! open leveraged position against the live market and enforces:
//! - Stop-loss / take-profit execution
//! - Margin-level enforcement (margin call at 100%, stop-out at 50%)
//! - Absolute and daily drawdown breaches
//!
//! All ledger mutations go through named atomic RPCs so no partial state is
//! ever observable.
//!
//! # Architecture
//!
//! ```text
//!  Exchange WS feed        ledger price_cache table
//!        │                         │
//!    ┌───▼───┐               ┌─────▼────┐
//!    │ Feed  │               │ Fallback │
//!    └───┬───┘               └─────┬────┘
//!        └────────┬────────────────┘
//!             ┌───▼────┐
//!             │ Price  │◄──── many readers per tick
//!             │ Cache  │
//!             └───┬────┘
//!   ┌─────────────┼──────────────┐
//!   │             │              │
//! ┌─▼────┐   ┌────▼───┐   ┌──────▼───┐
//! │SL/TP │   │ Margin │   │ Drawdown │
//! └─┬────┘   └────┬───┘   └──────┬───┘
//!   └─────────────┼──────────────┘
//!            ┌────▼────┐
//!            │ Closer  │──► close_position_atomic / breach_account_atomic
//!            └─────────┘
//! ```

pub mod clock;
pub mod closer;
pub mod config;
pub mod daily_reset;
pub mod drawdown;
pub mod fallback;
pub mod feed;
pub mod health;
pub mod ledger;
pub mod margin;
pub mod monitor;
pub mod price_cache;
pub mod sltp;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";
