//! Snapshot polling for the dashboard's REST upstreams
//!
//! Weather, crypto quotes, market charts and news are fetched periodically
//! and published as whole snapshots. Live prices from the price feed are
//! merged on top of these at display time.

pub mod alerts;
pub mod client;
pub mod crypto;
pub mod news;
pub mod poller;
pub mod weather;

#[cfg(test)]
mod test_server;

pub use alerts::{WeatherAlert, WeatherAlertTracker, DEFAULT_ALERT_THRESHOLD_C};
pub use client::{require_key, with_rate_limit_retry, ApiClient, ApiConfig};
pub use crypto::{fetch_market_chart, fetch_quotes, QuoteSnapshot};
pub use news::fetch_news;
pub use poller::{PollStats, Poller};
pub use weather::{fetch_weather, WeatherSnapshot};
