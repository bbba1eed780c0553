//! The main application logic, decoupled from the entry point.

use crate::{
    btrfs::{BtrfsCommand, BtrfsGauges, CommandRunner},
    clock::{Clock, SystemClock},
    config::Config,
    internal_metrics::{
        server::{Exposition, MetricsServer},
        MetricsBuilder,
    },
    refresh::{RefreshLoop, ScrapeError},
    task_manager::TaskManager,
};
use anyhow::{anyhow, Context, Result};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::watch, task::JoinError, task::JoinHandle};
use tracing::{info, instrument, warn};

/// A handle to the running exporter.
pub struct App {
    task_manager: TaskManager,
    shutdown_tx: watch::Sender<bool>,
    refresh_task: JoinHandle<Result<(), ScrapeError>>,
    metrics_addr: SocketAddr,
    gauges: BtrfsGauges,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the metrics endpoint is actually bound to.
    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn gauges(&self) -> &BtrfsGauges {
        &self.gauges
    }

    /// Runs until `shutdown_signal` completes or the refresh loop stops on a
    /// fatal error, then shuts every task down.
    ///
    /// Returns an error when the refresh loop failed, so the caller can exit
    /// with a non-zero status.
    pub async fn run<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut refresh_task = self.refresh_task;

        let finished = tokio::select! {
            biased;
            joined = &mut refresh_task => Some(joined),
            _ = shutdown_signal => None,
        };

        // Stops the metrics server, and the refresh loop if it is still running.
        let _ = self.shutdown_tx.send(true);
        let joined = match finished {
            Some(joined) => joined,
            None => {
                info!("Shutdown signal received. Shutting down gracefully...");
                refresh_task.await
            }
        };

        self.task_manager.shutdown().await;
        info!("All tasks shut down.");
        refresh_outcome(joined)
    }
}

fn refresh_outcome(joined: Result<Result<(), ScrapeError>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context("metrics refresh loop terminated")),
        Err(e) => Err(anyhow!("metrics refresh loop panicked: {e}")),
    }
}

/// Builder for the exporter.
///
/// Components that touch the outside world can be overridden, which is how
/// the tests run the whole exporter without a real `btrfs` binary.
pub struct AppBuilder {
    config: Config,
    runner_override: Option<Arc<dyn CommandRunner>>,
    clock_override: Option<Arc<dyn Clock>>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            runner_override: None,
            clock_override: None,
        }
    }

    /// Overrides the process runner used to call `btrfs`.
    pub fn runner_override(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner_override = Some(runner);
        self
    }

    /// Overrides the clock driving the refresh loop.
    pub fn clock_override(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock_override = Some(clock);
        self
    }

    /// Binds the metrics endpoint, then spawns the server and the refresh
    /// loop. The first scrape cycle starts immediately.
    #[instrument(skip_all)]
    pub async fn build(self) -> Result<App> {
        let config = self.config;
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_manager = TaskManager::new(shutdown_rx);

        if config.monitor_paths.is_empty() {
            warn!("No monitor paths configured; only the scrape counter will be exported.");
        }

        // =========================================================================
        // 1. Registries and internal metrics
        // =========================================================================
        let gauges = BtrfsGauges::new(config.refresh_interval());
        let (metrics, prom_handle) = MetricsBuilder::new(&config.monitor_paths).build()?;

        // =========================================================================
        // 2. Metrics endpoint
        // =========================================================================
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics endpoint to {addr}"))?;
        let metrics_addr = listener.local_addr()?;
        info!("Serving metrics on http://{}/metrics", metrics_addr);

        let server = MetricsServer::new(
            listener,
            Exposition::new(prom_handle, gauges.families()),
            task_manager.shutdown_rx(),
        );
        task_manager.spawn("MetricsServer", server.run());

        // =========================================================================
        // 3. Refresh loop
        // =========================================================================
        let runner = self.runner_override.unwrap_or_else(|| {
            Arc::new(BtrfsCommand::new(
                config.btrfs_binary.clone(),
                config.command_timeout(),
            )) as Arc<dyn CommandRunner>
        });
        let clock = self
            .clock_override
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let refresh = RefreshLoop::new(
            config.monitor_paths.clone(),
            runner,
            gauges.clone(),
            Arc::new(metrics),
            clock,
            config.refresh_interval(),
        );
        let refresh_task = tokio::spawn(refresh.run(task_manager.shutdown_rx()));

        Ok(App {
            task_manager,
            shutdown_tx,
            refresh_task,
            metrics_addr,
            gauges,
        })
    }
}
