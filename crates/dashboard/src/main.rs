//! Crypto/Weather Nexus dashboard
//!
//! Main entry point

use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nexus_core::DashboardConfig;
use nexus_dashboard::DashboardService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Nexus dashboard v{}", env!("CARGO_PKG_VERSION"));

    let config = DashboardConfig::from_env()?;
    info!(
        "Tracking {} on {}, weather for {}",
        config.assets.join(", "),
        config.feed_url,
        config.cities.join(", ")
    );

    let service = DashboardService::new(config);
    service.start()?;
    info!("Press Ctrl+C to shutdown");

    shutdown_signal().await?;

    service.stop().await;
    info!("Shutdown complete after {} renders", service.stats().renders);
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }

    Ok(())
}
