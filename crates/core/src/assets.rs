//! Tracked assets and cities
//!
//! Asset ids are the lowercase CoinGecko/CoinCap identifiers; both APIs
//! share the same naming so one id works for the live feed and the REST
//! baseline.

/// Assets shown on the dashboard by default
pub const SUPPORTED_CRYPTOS: [&str; 3] = ["bitcoin", "ethereum", "dogecoin"];

/// Cities shown on the dashboard by default
pub const WEATHER_CITIES: [&str; 3] = ["New York", "London", "Tokyo"];

/// Map a route-style city key (`newyork`) to the city name the weather API
/// expects. Unknown keys are returned unchanged.
pub fn normalize_city_key(key: &str) -> String {
    match key.to_lowercase().as_str() {
        "newyork" => "New York".to_string(),
        "london" => "London".to_string(),
        "tokyo" => "Tokyo".to_string(),
        _ => key.to_string(),
    }
}

/// Key under which a city's weather is stored in a snapshot
pub fn city_key(city: &str) -> String {
    normalize_city_key(city).to_lowercase()
}
