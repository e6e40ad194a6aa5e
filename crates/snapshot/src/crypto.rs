//! Crypto market data (CoinGecko)

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use nexus_core::{CryptoQuote, HistoricalPrice, UpstreamResult};

use crate::client::{with_rate_limit_retry, ApiClient};

/// Quotes keyed by asset id
pub type QuoteSnapshot = HashMap<String, CryptoQuote>;

#[derive(Debug, Default, Deserialize)]
pub struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
}

impl From<&SimplePrice> for CryptoQuote {
    fn from(p: &SimplePrice) -> Self {
        CryptoQuote {
            price: p.usd.unwrap_or(0.0),
            change24h: p.usd_24h_change.unwrap_or(0.0),
            market_cap: p.usd_market_cap.unwrap_or(0.0),
            volume: p.usd_24h_vol.unwrap_or(0.0),
        }
    }
}

/// Every requested id gets a quote; ids missing upstream are zeroed
pub fn quotes_from_response(ids: &[String], body: &HashMap<String, SimplePrice>) -> QuoteSnapshot {
    ids.iter()
        .map(|id| {
            let quote = body.get(id).map(CryptoQuote::from).unwrap_or_default();
            (id.clone(), quote)
        })
        .collect()
}

/// Current price, 24h change, market cap and volume for `ids`
pub async fn fetch_quotes(client: &ApiClient, ids: &[String]) -> UpstreamResult<QuoteSnapshot> {
    let url = format!("{}/simple/price", client.config().crypto_api_url);
    let joined = ids.join(",");

    let body: HashMap<String, SimplePrice> = client
        .get_json(
            &url,
            &[
                ("ids", joined.as_str()),
                ("vs_currencies", "usd"),
                ("include_24hr_change", "true"),
                ("include_market_cap", "true"),
                ("include_24hr_vol", "true"),
            ],
        )
        .await?;

    Ok(quotes_from_response(ids, &body))
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
    #[serde(default)]
    market_caps: Vec<(f64, f64)>,
    #[serde(default)]
    total_volumes: Vec<(f64, f64)>,
}

/// Zip the three series by index. Market cap and volume default to 0 when
/// their series is shorter than the price series.
pub fn chart_from_response(body: &MarketChartResponse) -> Vec<HistoricalPrice> {
    body.prices
        .iter()
        .enumerate()
        .filter_map(|(i, &(ts_ms, price))| {
            let time = Utc.timestamp_millis_opt(ts_ms as i64).single()?;
            Some(HistoricalPrice {
                time,
                price,
                market_cap: body.market_caps.get(i).map_or(0.0, |p| p.1),
                volume: body.total_volumes.get(i).map_or(0.0, |p| p.1),
            })
        })
        .collect()
}

/// Price history for one asset, retried when rate limited
pub async fn fetch_market_chart(
    client: &ApiClient,
    id: &str,
    days: u32,
    interval: Option<&str>,
) -> UpstreamResult<Vec<HistoricalPrice>> {
    let config = client.config();
    let url = format!("{}/coins/{}/market_chart", config.crypto_api_url, id);
    let days = days.to_string();

    let mut query = vec![("vs_currency", "usd"), ("days", days.as_str())];
    if let Some(interval) = interval {
        query.push(("interval", interval));
    }

    let body: MarketChartResponse = with_rate_limit_retry(
        id,
        config.rate_limit_attempts,
        config.retry_delay,
        || client.get_json(&url, &query),
    )
    .await?;

    Ok(chart_from_response(&body))
}
