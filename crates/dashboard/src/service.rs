//! Dashboard service
//!
//! Wires the live price feed, the REST pollers and the render task together.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use nexus_core::{ConnectionState, DashboardConfig, LivePriceTable, NewsArticle};
use nexus_price_feed::{
    ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionStats, PriceStore,
    PriceStoreStats, Transport, WsTransport,
};
use nexus_snapshot::{
    fetch_market_chart, fetch_news, fetch_quotes, fetch_weather, ApiClient, ApiConfig, PollStats,
    Poller, QuoteSnapshot, WeatherSnapshot,
};

use crate::board::{merge_quotes, Board, DisplayQuote};

/// Everything owned by a running dashboard
struct Running {
    store: Arc<PriceStore>,
    connection: ConnectionHandle,
    quotes: Poller<QuoteSnapshot>,
    weather: Poller<WeatherSnapshot>,
    news: Poller<Vec<NewsArticle>>,
    render: JoinHandle<()>,
    started_at: Instant,
}

/// Service statistics
#[derive(Debug, Clone, Default)]
pub struct DashboardStats {
    pub running: bool,
    pub uptime: Duration,
    pub connection_state: ConnectionState,
    pub connection: ConnectionStats,
    pub store: PriceStoreStats,
    pub quote_polls: PollStats,
    pub weather_polls: PollStats,
    pub news_polls: PollStats,
    pub renders: u64,
}

pub struct DashboardService {
    config: Arc<DashboardConfig>,
    running: Mutex<Option<Running>>,
    renders: Arc<AtomicU64>,
}

impl DashboardService {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config: Arc::new(config),
            running: Mutex::new(None),
            renders: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Start everything against the real WebSocket feed
    pub fn start(&self) -> anyhow::Result<()> {
        self.start_with_transport(WsTransport)
    }

    /// Start everything with the given live feed transport. A second call
    /// while running is a no-op.
    pub fn start_with_transport<T: Transport>(&self, transport: T) -> anyhow::Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Dashboard already running");
            return Ok(());
        }

        let config = &self.config;
        let client = ApiClient::new(ApiConfig::from(config.as_ref()))?;

        if config.weather_api_key.is_none() {
            warn!("No weather API key configured, weather polls will fail");
        }
        if config.news_api_key.is_none() {
            warn!("No news API key configured, news polls will fail");
        }

        let store = Arc::new(PriceStore::new());
        let connection = ConnectionManager::spawn(
            transport,
            ConnectionConfig {
                url: config.feed_uri(),
                reconnect_delay: config.reconnect_delay(),
            },
            Arc::clone(&store),
        );
        connection.start();

        let quotes = {
            let client = client.clone();
            let ids = config.assets.clone();
            Poller::spawn("quotes", config.quote_poll_interval(), QuoteSnapshot::new(), move || {
                let client = client.clone();
                let ids = ids.clone();
                async move { fetch_quotes(&client, &ids).await }
            })
        };

        let weather = {
            let client = client.clone();
            let cities = config.cities.clone();
            Poller::spawn("weather", config.weather_poll_interval(), WeatherSnapshot::new(), move || {
                let client = client.clone();
                let cities = cities.clone();
                async move { fetch_weather(&client, &cities).await }
            })
        };

        let news = {
            let client = client.clone();
            let query = config.news_query.clone();
            Poller::spawn("news", config.news_poll_interval(), Vec::new(), move || {
                let client = client.clone();
                let query = query.clone();
                async move { fetch_news(&client, &query).await }
            })
        };

        let inputs = RenderInputs {
            live: store.subscribe(),
            connection: connection.subscribe_state(),
            quotes: quotes.subscribe(),
            weather: weather.subscribe(),
            news: news.subscribe(),
        };
        let render = tokio::spawn(render_loop(
            Arc::clone(&self.config),
            client,
            inputs,
            Arc::clone(&self.renders),
        ));

        *running = Some(Running {
            store,
            connection,
            quotes,
            weather,
            news,
            render,
            started_at: Instant::now(),
        });

        info!("Dashboard started, live feed {}", config.feed_uri());
        Ok(())
    }

    /// Close the socket, cancel reconnect timers and in-flight polls, and
    /// stop rendering. Returns once the connection is down. Idempotent.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };

        let Running {
            connection,
            mut quotes,
            mut weather,
            mut news,
            render,
            ..
        } = running;

        render.abort();
        quotes.stop();
        weather.stop();
        news.stop();
        connection.shutdown().await;

        info!("Dashboard stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Live store of the running dashboard
    pub fn store(&self) -> Option<Arc<PriceStore>> {
        self.running.lock().as_ref().map(|r| Arc::clone(&r.store))
    }

    /// Current merged crypto board, empty when stopped
    pub fn quotes(&self) -> BTreeMap<String, DisplayQuote> {
        match self.running.lock().as_ref() {
            Some(r) => merge_quotes(&r.quotes.snapshot(), &r.store.snapshot()),
            None => BTreeMap::new(),
        }
    }

    pub fn stats(&self) -> DashboardStats {
        let renders = self.renders.load(Ordering::Relaxed);
        match self.running.lock().as_ref() {
            Some(r) => DashboardStats {
                running: true,
                uptime: r.started_at.elapsed(),
                connection_state: r.connection.state(),
                connection: r.connection.stats(),
                store: r.store.stats(),
                quote_polls: r.quotes.stats(),
                weather_polls: r.weather.stats(),
                news_polls: r.news.stats(),
                renders,
            },
            None => DashboardStats {
                renders,
                ..Default::default()
            },
        }
    }
}

/// Watch receivers the render task redraws from
struct RenderInputs {
    live: watch::Receiver<Arc<LivePriceTable>>,
    connection: watch::Receiver<ConnectionState>,
    quotes: watch::Receiver<Arc<QuoteSnapshot>>,
    weather: watch::Receiver<Arc<WeatherSnapshot>>,
    news: watch::Receiver<Arc<Vec<NewsArticle>>>,
}

enum Update {
    Live(Arc<LivePriceTable>),
    Connection(ConnectionState),
    Quotes(Arc<QuoteSnapshot>),
    Weather(Arc<WeatherSnapshot>),
    News(Arc<Vec<NewsArticle>>),
}

/// Re-render whenever any input changes. Also seeds the live chart from the
/// market chart once.
async fn render_loop(
    config: Arc<DashboardConfig>,
    client: ApiClient,
    inputs: RenderInputs,
    renders: Arc<AtomicU64>,
) {
    let mut board = Board::new(
        config.series_asset.clone(),
        config.series_len,
        config.alert_threshold_c,
    );

    let mut updates = WatchStream::new(inputs.live)
        .map(Update::Live)
        .merge(WatchStream::new(inputs.connection).map(Update::Connection))
        .merge(WatchStream::new(inputs.quotes).map(Update::Quotes))
        .merge(WatchStream::new(inputs.weather).map(Update::Weather))
        .merge(WatchStream::new(inputs.news).map(Update::News));

    let chart = fetch_market_chart(&client, &config.series_asset, config.chart_days, None);
    tokio::pin!(chart);
    let mut seeded = false;

    loop {
        tokio::select! {
            result = &mut chart, if !seeded => {
                seeded = true;
                match result {
                    Ok(history) => {
                        debug!("Seeding {} chart with {} points", config.series_asset, history.len());
                        board.seed_series(&history);
                    }
                    Err(e) => warn!("Failed to load {} chart history: {}", config.series_asset, e),
                }
            }
            update = updates.next() => {
                let Some(update) = update else { break };
                match update {
                    Update::Live(table) => {
                        board.on_live(table, Utc::now());
                    }
                    Update::Connection(state) => {
                        if board.on_connection(state) {
                            if state.is_live() {
                                info!("Live feed {}", state);
                            } else {
                                warn!("Live feed {}, showing last known prices", state);
                            }
                        }
                    }
                    Update::Quotes(snapshot) => board.on_quotes(snapshot),
                    Update::Weather(snapshot) => {
                        for alert in board.on_weather(snapshot) {
                            warn!("{}", alert);
                        }
                    }
                    Update::News(articles) => board.on_news(articles),
                }
            }
        }

        renders.fetch_add(1, Ordering::Relaxed);
        for line in board.lines() {
            debug!("{}", line);
        }
    }

    debug!("Render loop exited");
}
