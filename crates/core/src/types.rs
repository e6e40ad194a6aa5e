//! Core type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Latest known live price for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPriceRecord {
    pub id: String,
    /// Latest price in USD
    pub price: f64,
    /// 24h change in percent. Carried over when a newer update omits it.
    pub change24h: Option<f64>,
}

impl AssetPriceRecord {
    pub fn new(id: impl Into<String>, price: f64, change24h: Option<f64>) -> Self {
        Self {
            id: id.into(),
            price,
            change24h,
        }
    }

    /// Apply a sparse update. Returns true if any field changed.
    pub fn merge(&mut self, price: f64, change24h: Option<f64>) -> bool {
        let next_change = change24h.or(self.change24h);
        if self.price == price && self.change24h == next_change {
            return false;
        }
        self.price = price;
        self.change24h = next_change;
        true
    }
}

/// One decoded (id, price) pair from the live feed
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub id: String,
    pub price: f64,
}

impl PriceTick {
    pub fn new(id: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            price,
        }
    }
}

/// Live price table keyed by asset id. Grows by upsert only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LivePriceTable {
    records: HashMap<String, AssetPriceRecord>,
}

impl LivePriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&AssetPriceRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetPriceRecord> {
        self.records.values()
    }

    /// Insert or sparsely merge a record. Returns true if the table changed.
    pub fn upsert(&mut self, id: &str, price: f64, change24h: Option<f64>) -> bool {
        match self.records.get_mut(id) {
            Some(existing) => existing.merge(price, change24h),
            None => {
                self.records
                    .insert(id.to_string(), AssetPriceRecord::new(id, price, change24h));
                true
            }
        }
    }
}

/// Coarse state of the live connection, as shown to observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Market snapshot for one asset from the REST price endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CryptoQuote {
    pub price: f64,
    pub change24h: f64,
    pub market_cap: f64,
    pub volume: f64,
}

/// One point of a market chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPrice {
    pub time: DateTime<Utc>,
    pub price: f64,
    pub market_cap: f64,
    pub volume: f64,
}

/// Current weather for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Celsius
    pub temperature: f64,
    pub condition: String,
    /// Percent
    pub humidity: f64,
    /// Meters per second
    pub wind_speed: f64,
    /// Set when the upstream request failed and the values are placeholders
    pub error: Option<String>,
}

impl WeatherReport {
    /// Zeroed report used when a city could not be fetched
    pub fn placeholder(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

impl Default for WeatherReport {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            condition: "Unknown".to_string(),
            humidity: 0.0,
            wind_speed: 0.0,
            error: None,
        }
    }
}

/// Upstream JSON uses `null` for missing strings
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsSource {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// News article as returned by the news endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: NewsSource,
    #[serde(rename = "urlToImage", default)]
    pub url_to_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_merge_keeps_change() {
        let mut record = AssetPriceRecord::new("bitcoin", 50_000.0, Some(2.1));
        assert!(record.merge(50_500.0, None));
        assert_eq!(record.price, 50_500.0);
        assert_eq!(record.change24h, Some(2.1));
    }

    #[test]
    fn test_merge_reports_no_change() {
        let mut record = AssetPriceRecord::new("bitcoin", 50_000.0, Some(2.1));
        assert!(!record.merge(50_000.0, None));
        assert!(!record.merge(50_000.0, Some(2.1)));
        assert!(record.merge(50_000.0, Some(-1.0)));
    }

    #[test]
    fn test_table_upsert() {
        let mut table = LivePriceTable::new();
        assert!(table.upsert("ethereum", 3_000.0, None));
        assert!(table.upsert("ethereum", 3_010.0, Some(0.5)));
        assert!(table.upsert("ethereum", 3_020.0, None));

        let record = table.get("ethereum").unwrap();
        assert_eq!(record.price, 3_020.0);
        assert_eq!(record.change24h, Some(0.5));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_news_article_tolerates_missing_fields() {
        let article: NewsArticle =
            serde_json::from_str(r#"{"title":"BTC up","url":"https://x","source":{"name":"Wire"}}"#)
                .unwrap();
        assert_eq!(article.title, "BTC up");
        assert_eq!(article.description, "");
        assert_eq!(article.source.name, "Wire");
        assert!(article.url_to_image.is_none());
    }

    #[test]
    fn test_news_article_null_description() {
        let article: NewsArticle = serde_json::from_str(
            r#"{"title":"ETH","description":null,"url":"u","source":{"name":null}}"#,
        )
        .unwrap();
        assert_eq!(article.description, "");
        assert_eq!(article.source.name, "");
    }

    #[test]
    fn test_placeholder_weather() {
        let report = WeatherReport::placeholder("timeout");
        assert!(report.is_placeholder());
        assert_eq!(report.condition, "Unknown");
        assert_eq!(report.temperature, 0.0);
    }

    #[test]
    fn test_only_connected_is_live() {
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Connecting.is_live());
        assert!(!ConnectionState::Reconnecting.is_live());
        assert!(!ConnectionState::default().is_live());
    }
}
