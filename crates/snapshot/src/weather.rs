//! Current weather per city (OpenWeatherMap)

use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::error;

use nexus_core::{city_key, normalize_city_key, UpstreamResult, WeatherReport};

use crate::client::{require_key, ApiClient};

/// Weather per city, keyed by `city_key`
pub type WeatherSnapshot = HashMap<String, WeatherReport>;

#[derive(Debug, Default, Deserialize)]
pub struct OpenWeatherResponse {
    #[serde(default)]
    main: Option<MainBlock>,
    #[serde(default)]
    weather: Option<Vec<ConditionBlock>>,
    #[serde(default)]
    wind: Option<WindBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct MainBlock {
    temp: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionBlock {
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WindBlock {
    speed: Option<f64>,
}

impl From<OpenWeatherResponse> for WeatherReport {
    fn from(body: OpenWeatherResponse) -> Self {
        let main = body.main.unwrap_or_default();
        let condition = body
            .weather
            .and_then(|w| w.into_iter().next())
            .and_then(|c| c.description)
            .unwrap_or_else(|| "Unknown".to_string());

        WeatherReport {
            temperature: main.temp.unwrap_or(0.0),
            condition,
            humidity: main.humidity.unwrap_or(0.0),
            wind_speed: body.wind.and_then(|w| w.speed).unwrap_or(0.0),
            error: None,
        }
    }
}

/// Weather for one city, metric units
pub async fn fetch_city(client: &ApiClient, api_key: &str, city: &str) -> UpstreamResult<WeatherReport> {
    let body: OpenWeatherResponse = client
        .get_json(
            &client.config().weather_api_url,
            &[("q", city), ("appid", api_key), ("units", "metric")],
        )
        .await?;

    Ok(body.into())
}

/// Weather for every city, fetched concurrently.
///
/// A city that fails gets a placeholder report carrying the error; only a
/// missing API key fails the whole call.
pub async fn fetch_weather(client: &ApiClient, cities: &[String]) -> UpstreamResult<WeatherSnapshot> {
    let api_key = require_key(client.config().weather_api_key.as_deref(), "Weather")?;

    let requests = cities.iter().map(|city| async move {
        let name = normalize_city_key(city);
        let report = match fetch_city(client, api_key, &name).await {
            Ok(report) => report,
            Err(e) => {
                error!("Error fetching weather for {}: {}", name, e);
                WeatherReport::placeholder(e.to_string())
            }
        };
        (city_key(&name), report)
    });

    Ok(join_all(requests).await.into_iter().collect())
}
