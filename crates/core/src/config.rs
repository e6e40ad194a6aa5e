//! Configuration types
//!
//! Values come from `NEXUS_*` environment variables (after `.env` is loaded
//! by the binary) layered over the defaults below. List values are comma
//! separated, e.g. `NEXUS_ASSETS=bitcoin,ethereum`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::assets::{SUPPORTED_CRYPTOS, WEATHER_CITIES};
use crate::errors::{ConfigError, ConfigResult};

/// Complete dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Live price stream endpoint, without the subscription query
    pub feed_url: String,
    /// Assets subscribed on the live feed and polled from the REST API
    pub assets: Vec<String>,
    pub reconnect_delay_ms: u64,

    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub cities: Vec<String>,

    pub crypto_api_url: String,

    pub news_api_url: String,
    pub news_api_key: Option<String>,
    pub news_query: String,

    pub quote_poll_secs: u64,
    pub weather_poll_secs: u64,
    pub news_poll_secs: u64,

    pub http_timeout_secs: u64,
    /// Total attempts for a rate-limited chart request
    pub rate_limit_attempts: u32,
    pub retry_delay_ms: u64,

    /// Asset whose live prices are charted
    pub series_asset: String,
    pub series_len: usize,
    /// Days of market chart history used to seed the chart
    pub chart_days: u32,

    /// Temperature jump between polls that raises an alert, in Celsius
    pub alert_threshold_c: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            feed_url: "wss://ws.coincap.io/prices".to_string(),
            assets: SUPPORTED_CRYPTOS.iter().map(|s| s.to_string()).collect(),
            reconnect_delay_ms: 5_000,
            weather_api_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            weather_api_key: None,
            cities: WEATHER_CITIES.iter().map(|s| s.to_string()).collect(),
            crypto_api_url: "https://api.coingecko.com/api/v3".to_string(),
            news_api_url: "https://newsapi.org/v2/everything".to_string(),
            news_api_key: None,
            news_query: "cryptocurrency".to_string(),
            quote_poll_secs: 10,
            weather_poll_secs: 30,
            news_poll_secs: 900,
            http_timeout_secs: 10,
            rate_limit_attempts: 3,
            retry_delay_ms: 1_000,
            series_asset: "bitcoin".to_string(),
            series_len: 20,
            chart_days: 7,
            alert_threshold_c: 5.0,
        }
    }
}

impl DashboardConfig {
    /// Load from `NEXUS_*` environment variables over the defaults
    pub fn from_env() -> ConfigResult<Self> {
        let source = ::config::Environment::with_prefix("NEXUS")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("assets")
            .with_list_parse_key("cities");

        let config: DashboardConfig = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.feed_url.starts_with("ws://") || self.feed_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "feed_url must be a ws:// or wss:// URL, got {}",
                self.feed_url
            )));
        }
        if self.assets.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::Invalid("assets must not be empty".to_string()));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid("reconnect_delay_ms must be > 0".to_string()));
        }
        let intervals = [
            ("quote_poll_secs", self.quote_poll_secs),
            ("weather_poll_secs", self.weather_poll_secs),
            ("news_poll_secs", self.news_poll_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        if self.rate_limit_attempts == 0 {
            return Err(ConfigError::Invalid("rate_limit_attempts must be > 0".to_string()));
        }
        if self.series_len == 0 {
            return Err(ConfigError::Invalid("series_len must be > 0".to_string()));
        }
        Ok(())
    }

    /// Feed URL with the subscription set encoded in the query
    pub fn feed_uri(&self) -> String {
        let assets: Vec<&str> = self
            .assets
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        let sep = if self.feed_url.contains('?') { '&' } else { '?' };
        format!("{}{}assets={}", self.feed_url, sep, assets.join(","))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn quote_poll_interval(&self) -> Duration {
        Duration::from_secs(self.quote_poll_secs)
    }

    pub fn weather_poll_interval(&self) -> Duration {
        Duration::from_secs(self.weather_poll_secs)
    }

    pub fn news_poll_interval(&self) -> Duration {
        Duration::from_secs(self.news_poll_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect_delay(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_feed_uri_encodes_assets() {
        let config = DashboardConfig::default();
        assert_eq!(
            config.feed_uri(),
            "wss://ws.coincap.io/prices?assets=bitcoin,ethereum,dogecoin"
        );

        let config = DashboardConfig {
            feed_url: "wss://feed.example/prices?v=2".to_string(),
            assets: vec!["bitcoin".to_string(), " ".to_string()],
            ..Default::default()
        };
        assert_eq!(config.feed_uri(), "wss://feed.example/prices?v=2&assets=bitcoin");
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = DashboardConfig {
            feed_url: "https://ws.coincap.io/prices".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DashboardConfig {
            assets: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DashboardConfig {
            weather_poll_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DashboardConfig {
            rate_limit_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
