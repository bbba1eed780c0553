//! btrfs-exporter - Prometheus exporter for btrfs device and usage statistics
//!
//! Periodically calls `btrfs device stats` and `btrfs filesystem usage` for
//! every configured mount point and serves the results on `/metrics`.

use anyhow::Result;
use btrfs_exporter::{app::App, cli::Cli, config::Config};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        tracing_subscriber::fmt().init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("btrfs-exporter starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Metrics Endpoint: {}", config.socket_addr());
    info!("Refresh Interval: {}s", config.refresh_interval_seconds);
    info!("Series TTL: {}s", config.series_ttl().as_secs());
    info!("Btrfs Binary: {}", config.btrfs_binary);
    match config.command_timeout_seconds {
        Some(timeout) => info!("Command Timeout: {}s", timeout),
        None => info!("Command Timeout: none"),
    }
    for path in &config.monitor_paths {
        info!("Monitor Path: {}", path);
    }
    info!("-------------------------------------------------------");

    let app = App::builder(config).build().await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal: {}", e);
        }
    };

    if let Err(e) = app.run(shutdown_signal).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("btrfs-exporter stopped.");
    Ok(())
}
