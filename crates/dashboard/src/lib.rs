//! Crypto/weather/news dashboard
//!
//! Combines the live price feed with periodically polled REST snapshots and
//! renders the merged board.

pub mod board;
pub mod service;

pub use board::{
    format_change, format_price, format_usd_compact, merge_quotes, Board, DisplayQuote,
    LiveSeries, SeriesPoint, NOT_AVAILABLE,
};
pub use service::{DashboardService, DashboardStats};
