//! Test helpers for running the full exporter in-process.

use anyhow::{anyhow, Result};
use btrfs_exporter::{app::App, btrfs::BtrfsGauges, btrfs::CommandRunner, config::Config};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

/// A config bound to an ephemeral localhost port.
pub fn test_config(paths: &[&str]) -> Config {
    Config {
        listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        monitor_paths: paths.iter().map(|p| p.to_string()).collect(),
        ..Config::default()
    }
}

/// A running exporter instance.
pub struct TestApp {
    shutdown_tx: Option<oneshot::Sender<()>>,
    app_handle: JoinHandle<Result<()>>,
    metrics_addr: SocketAddr,
    pub gauges: BtrfsGauges,
}

impl TestApp {
    pub async fn start(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let app = App::builder(config).runner_override(runner).build().await?;
        let metrics_addr = app.metrics_addr();
        let gauges = app.gauges().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app_handle = tokio::spawn(app.run(async {
            let _ = shutdown_rx.await;
        }));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            app_handle,
            metrics_addr,
            gauges,
        })
    }

    pub fn metrics_url(&self) -> String {
        format!("http://{}/metrics", self.metrics_addr)
    }

    pub async fn fetch_metrics(&self) -> Result<String> {
        Ok(reqwest::get(self.metrics_url()).await?.text().await?)
    }

    /// Polls `/metrics` until `ready` accepts the body.
    pub async fn wait_for_metrics<F>(&self, ready: F, timeout_duration: Duration) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        let start = std::time::Instant::now();
        loop {
            let body = self.fetch_metrics().await?;
            if ready(&body) {
                return Ok(body);
            }
            if start.elapsed() > timeout_duration {
                return Err(anyhow!("timed out waiting for metrics, last body:\n{body}"));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Waits for the exporter to stop on its own, e.g. after a fatal error.
    pub async fn join(self, timeout_duration: Duration) -> Result<Result<()>> {
        let outcome = timeout(timeout_duration, self.app_handle).await??;
        Ok(outcome)
    }

    /// Signals shutdown and returns what `App::run` returned.
    pub async fn shutdown(mut self, timeout_duration: Duration) -> Result<Result<()>> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join(timeout_duration).await
    }
}
