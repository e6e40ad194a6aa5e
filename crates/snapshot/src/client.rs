//! Shared HTTP client for the REST upstreams

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use nexus_core::{DashboardConfig, UpstreamError, UpstreamResult};

/// Upstream endpoints and credentials
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub weather_api_url: String,
    pub weather_api_key: Option<String>,
    pub crypto_api_url: String,
    pub news_api_url: String,
    pub news_api_key: Option<String>,
    pub timeout: Duration,
    /// Total attempts for rate-limited calls, first try included
    pub rate_limit_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&DashboardConfig> for ApiConfig {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            weather_api_url: config.weather_api_url.clone(),
            weather_api_key: config.weather_api_key.clone(),
            crypto_api_url: config.crypto_api_url.trim_end_matches('/').to_string(),
            news_api_url: config.news_api_url.clone(),
            news_api_key: config.news_api_key.clone(),
            timeout: config.http_timeout(),
            rate_limit_attempts: config.rate_limit_attempts,
            retry_delay: config.retry_delay(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

/// Cheap to clone; clones share the connection pool
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ApiConfig>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("nexus-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// GET `url` with `query` and decode a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> UpstreamResult<T> {
        debug!("GET {}", url);

        // Query strings carry API keys: keep URLs out of error text
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.without_url().to_string()))?;

        check_status(url, response.status())?;

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.without_url().to_string()))
    }
}

fn check_status(url: &str, status: StatusCode) -> UpstreamResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(UpstreamError::RateLimited(url.to_string()));
    }
    if !status.is_success() {
        return Err(UpstreamError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Fail early when a service needs a key that is not configured
pub fn require_key<'a>(key: Option<&'a str>, service: &'static str) -> UpstreamResult<&'a str> {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(UpstreamError::MissingApiKey(service)),
    }
}

/// Run `call` up to `attempts` times, retrying rate-limited failures with
/// linear backoff (`delay`, `2 * delay`, ...). Other errors are returned
/// immediately.
pub async fn with_rate_limit_retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    delay: Duration,
    mut call: F,
) -> UpstreamResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = UpstreamResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Err(e) if e.is_rate_limited() && attempt < attempts => {
                let wait = delay * attempt;
                attempt += 1;
                warn!("Rate limited for {}. Retrying in {:?}...", what, wait);
                tokio::time::sleep(wait).await;
            }
            result => return result,
        }
    }
}
