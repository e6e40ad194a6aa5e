//! Dashboard view model
//!
//! REST snapshots are the baseline; live prices from the feed are merged on
//! top at display time and always win.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use nexus_core::{
    ConnectionState, CryptoQuote, HistoricalPrice, LivePriceTable, NewsArticle, WeatherReport,
};
use nexus_snapshot::{QuoteSnapshot, WeatherAlert, WeatherAlertTracker, WeatherSnapshot};

/// Rendered in place of a missing value
pub const NOT_AVAILABLE: &str = "N/A";

/// One row of the crypto board
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayQuote {
    pub price: f64,
    pub change24h: f64,
    pub market_cap: f64,
    pub volume: f64,
    /// Price comes from the live feed rather than the last REST poll
    pub live: bool,
}

impl From<&CryptoQuote> for DisplayQuote {
    fn from(quote: &CryptoQuote) -> Self {
        Self {
            price: quote.price,
            change24h: quote.change24h,
            market_cap: quote.market_cap,
            volume: quote.volume,
            live: false,
        }
    }
}

/// Union of baseline and live ids. Live price overrides the baseline price,
/// live 24h change overrides the baseline one when the feed carried it.
/// Market cap and volume are baseline only.
pub fn merge_quotes(baseline: &QuoteSnapshot, live: &LivePriceTable) -> BTreeMap<String, DisplayQuote> {
    let mut board: BTreeMap<String, DisplayQuote> = baseline
        .iter()
        .map(|(id, quote)| (id.clone(), DisplayQuote::from(quote)))
        .collect();

    for record in live.iter() {
        let row = board.entry(record.id.clone()).or_default();
        row.price = record.price;
        if let Some(change) = record.change24h {
            row.change24h = change;
        }
        row.live = true;
    }

    board
}

/// `$1.23B`, `$4.56M`, `$7.89K` or `$12.34`
pub fn format_usd_compact(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    if value >= 1e9 {
        format!("${:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("${:.2}M", value / 1e6)
    } else if value >= 1e3 {
        format!("${:.2}K", value / 1e3)
    } else {
        format!("${:.2}", value)
    }
}

pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p.is_finite() => format!("${:.2}", p),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c.is_finite() => format!("{:+.2}%", c),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_weather(city: &str, report: &WeatherReport) -> String {
    match &report.error {
        Some(e) => format!("{}: {} ({})", city, NOT_AVAILABLE, e),
        None => format!(
            "{}: {:.1}°C, {}, humidity {:.0}%, wind {:.1} m/s",
            city, report.temperature, report.condition, report.humidity, report.wind_speed
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Fixed-capacity window of recent prices for one asset
#[derive(Debug, Clone)]
pub struct LiveSeries {
    capacity: usize,
    points: VecDeque<SeriesPoint>,
}

impl LiveSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Append a point, evicting the oldest when full
    pub fn push(&mut self, time: DateTime<Utc>, price: f64) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(SeriesPoint { time, price });
    }

    /// Append only when `price` differs from the latest point
    pub fn record(&mut self, time: DateTime<Utc>, price: f64) -> bool {
        if self.latest().map_or(false, |p| p.price == price) {
            return false;
        }
        self.push(time, price);
        true
    }

    /// Put chart history in front of the window. Live points newer than the
    /// history are kept.
    pub fn seed(&mut self, history: &[HistoricalPrice]) {
        let Some(last) = history.last() else {
            return;
        };

        let live: Vec<SeriesPoint> = self
            .points
            .drain(..)
            .filter(|p| p.time > last.time)
            .collect();

        let skip = history.len().saturating_sub(self.capacity);
        for h in &history[skip..] {
            self.push(h.time, h.price);
        }
        for p in live {
            self.push(p.time, p.price);
        }
    }
}

/// Everything the dashboard renders, updated piecewise by the render task
#[derive(Debug)]
pub struct Board {
    baseline: Arc<QuoteSnapshot>,
    live: Arc<LivePriceTable>,
    weather: Arc<WeatherSnapshot>,
    news: Arc<Vec<NewsArticle>>,
    series_asset: String,
    series: LiveSeries,
    alerts: WeatherAlertTracker,
    connection: ConnectionState,
}

impl Board {
    pub fn new(series_asset: impl Into<String>, series_len: usize, alert_threshold_c: f64) -> Self {
        Self {
            baseline: Arc::default(),
            live: Arc::default(),
            weather: Arc::default(),
            news: Arc::default(),
            series_asset: series_asset.into(),
            series: LiveSeries::new(series_len),
            alerts: WeatherAlertTracker::new(alert_threshold_c),
            connection: ConnectionState::default(),
        }
    }

    /// New live table. Returns true when the charted asset got a new price.
    pub fn on_live(&mut self, table: Arc<LivePriceTable>, now: DateTime<Utc>) -> bool {
        let charted = table
            .get(&self.series_asset)
            .map_or(false, |r| self.series.record(now, r.price));
        self.live = table;
        charted
    }

    pub fn on_quotes(&mut self, quotes: Arc<QuoteSnapshot>) {
        self.baseline = quotes;
    }

    /// New weather poll and the alerts it raised
    pub fn on_weather(&mut self, weather: Arc<WeatherSnapshot>) -> Vec<WeatherAlert> {
        let alerts = self.alerts.observe_all(&weather);
        self.weather = weather;
        alerts
    }

    pub fn on_news(&mut self, news: Arc<Vec<NewsArticle>>) {
        self.news = news;
    }

    /// Returns true when the state actually changed
    pub fn on_connection(&mut self, state: ConnectionState) -> bool {
        std::mem::replace(&mut self.connection, state) != state
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn seed_series(&mut self, history: &[HistoricalPrice]) {
        self.series.seed(history);
    }

    pub fn quotes(&self) -> BTreeMap<String, DisplayQuote> {
        merge_quotes(&self.baseline, &self.live)
    }

    pub fn series(&self) -> &LiveSeries {
        &self.series
    }

    pub fn news(&self) -> &[NewsArticle] {
        &self.news
    }

    /// Plain-text rendering, one line per row
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .quotes()
            .iter()
            .map(|(id, q)| {
                format!(
                    "{:<10} {:>14} {:>8} (24h)  cap {:>10}  vol {:>10}{}",
                    id,
                    format_price(Some(q.price)),
                    format_change(Some(q.change24h)),
                    format_usd_compact(q.market_cap),
                    format_usd_compact(q.volume),
                    if q.live { "  live" } else { "" },
                )
            })
            .collect();

        if let Some(point) = self.series.latest() {
            lines.push(format!(
                "{} chart: {} points, last {}",
                self.series_asset,
                self.series.len(),
                format_price(Some(point.price))
            ));
        }

        let mut cities: Vec<(&String, &WeatherReport)> = self.weather.iter().collect();
        cities.sort_by(|a, b| a.0.cmp(b.0));
        lines.extend(cities.into_iter().map(|(city, report)| format_weather(city, report)));

        match self.news.first() {
            Some(article) => lines.push(format!("news: {} ({})", article.title, article.source.name)),
            None => lines.push(format!("news: {}", NOT_AVAILABLE)),
        }

        // Prices shown while the socket is down are the REST baseline or stale
        lines.push(if self.connection.is_live() {
            format!("live feed: {}", self.connection)
        } else {
            format!("live feed: {} (prices may be stale)", self.connection)
        });

        lines
    }
}
