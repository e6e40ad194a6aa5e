//! Sudden temperature change detection across weather polls

use std::collections::HashMap;
use std::fmt;

use nexus_core::WeatherReport;

use crate::weather::WeatherSnapshot;

/// Default alert threshold in °C
pub const DEFAULT_ALERT_THRESHOLD_C: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAlert {
    pub city: String,
    pub previous: f64,
    pub current: f64,
    pub condition: String,
    pub wind_speed: f64,
}

impl WeatherAlert {
    /// Signed temperature change
    pub fn delta(&self) -> f64 {
        self.current - self.previous
    }

    pub fn message(&self) -> String {
        format!(
            "Sudden temperature change in {}! Now: {:.1}°C",
            self.city, self.current
        )
    }
}

impl fmt::Display for WeatherAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:+.1}°C, {}, wind {:.1} m/s)",
            self.message(),
            self.delta(),
            self.condition,
            self.wind_speed
        )
    }
}

/// Remembers the last real temperature per city
#[derive(Debug)]
pub struct WeatherAlertTracker {
    threshold: f64,
    last_seen: HashMap<String, f64>,
}

impl Default for WeatherAlertTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_THRESHOLD_C)
    }
}

impl WeatherAlertTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.abs(),
            last_seen: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record `report` for `city` and return an alert when the temperature
    /// moved by at least the threshold. Placeholder reports are ignored and
    /// do not overwrite the last real reading.
    pub fn observe(&mut self, city: &str, report: &WeatherReport) -> Option<WeatherAlert> {
        if report.is_placeholder() {
            return None;
        }

        let previous = self.last_seen.insert(city.to_string(), report.temperature)?;

        if (report.temperature - previous).abs() >= self.threshold {
            Some(WeatherAlert {
                city: city.to_string(),
                previous,
                current: report.temperature,
                condition: report.condition.clone(),
                wind_speed: report.wind_speed,
            })
        } else {
            None
        }
    }

    /// Observe every city of a poll; alerts are ordered by city
    pub fn observe_all(&mut self, snapshot: &WeatherSnapshot) -> Vec<WeatherAlert> {
        let mut cities: Vec<&String> = snapshot.keys().collect();
        cities.sort();

        cities
            .into_iter()
            .filter_map(|city| self.observe(city, &snapshot[city]))
            .collect()
    }
}
