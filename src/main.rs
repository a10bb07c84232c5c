use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use restock_watcher::config::LoggingConfig;
use restock_watcher::plugins::extractors::MicroCenterExtractor;
use restock_watcher::plugins::notifiers::DiscordNotifier;
use restock_watcher::scraper::HttpFetcher;
use restock_watcher::{AppConfig, Monitor, SweepScheduler, TrackingStore};

#[derive(Debug, Parser)]
#[command(name = "restock-watcher", version, about = "Watches store inventory and sends restock alerts")]
struct Cli {
    /// Run a single sweep over all tracked items and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "restock-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging);

    info!("Starting Restock Watcher...");

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exported on port {}", config.metrics.port);
    }

    let store = TrackingStore::connect(&config.database)
        .await
        .context("Failed to open database")?;
    store.migrate().await.context("Failed to run migrations")?;
    info!("{} item(s) currently tracked", store.count_tracked_items().await?);

    let fetcher = HttpFetcher::new(&config.monitor)?;
    let notifier = DiscordNotifier::new(&config.discord)?;

    let monitor = Arc::new(Monitor::new(
        store,
        Arc::new(fetcher),
        Arc::new(MicroCenterExtractor::new()),
        Arc::new(notifier),
        &config.monitor,
    ));

    if cli.once {
        let report = monitor.run_sweep().await?;
        info!(
            "Sweep complete: {} checked, {} failed, {} notification(s) sent",
            report.items_checked, report.items_failed, report.notifications_sent
        );
        return Ok(());
    }

    let mut scheduler = SweepScheduler::new(Arc::clone(&monitor), config.monitor.check_interval()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.shutdown().await?;

    Ok(())
}
