//! The scrape -> parse -> publish cycle.
//!
//! One [`RefreshLoop`] drives every monitored path sequentially: it invokes
//! `btrfs` twice per path, writes the parsed values into the stale-aware
//! gauges, sweeps expired series once all paths are done, and then sleeps for
//! the refresh interval. Only a missing `btrfs` binary ends the loop with an
//! error; every other failure skips the affected sub-scrape for one cycle.

use crate::btrfs::{
    parse_device_stats, parse_filesystem_usage, BtrfsGauges, CommandError, CommandRunner,
    ParseError, ScrapeKind,
};
use crate::clock::Clock;
use crate::internal_metrics::Metrics;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

/// Why a sub-scrape produced no values.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("the '{program}' program cannot be found; maybe it still needs to be installed")]
    ToolNotFound { program: String },
    #[error("btrfs exited with code {exit_code:?}, stderr: '{stderr}'")]
    NonZeroExit {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("btrfs returned no output")]
    EmptyOutput,
    #[error("btrfs did not finish within {0:?}")]
    Timeout(Duration),
    #[error("failed to run btrfs: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ScrapeError {
    /// Fatal errors stop the exporter; all others only skip one sub-scrape.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::ToolNotFound { .. })
    }
}

impl From<CommandError> for ScrapeError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::ToolNotFound { program } => ScrapeError::ToolNotFound { program },
            CommandError::Spawn { source, .. } => ScrapeError::Spawn(source),
            CommandError::Timeout { timeout, .. } => ScrapeError::Timeout(timeout),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of `set` calls across all gauges.
    pub series_updated: usize,
    /// Sub-scrapes skipped because of a recoverable failure.
    pub failed_scrapes: usize,
    /// Series removed by the end-of-cycle sweep.
    pub evicted: usize,
}

pub struct RefreshLoop {
    targets: BTreeSet<String>,
    runner: Arc<dyn CommandRunner>,
    gauges: BtrfsGauges,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cycles_completed: u64,
}

impl RefreshLoop {
    pub fn new(
        targets: BTreeSet<String>,
        runner: Arc<dyn CommandRunner>,
        gauges: BtrfsGauges,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            targets,
            runner,
            gauges,
            metrics,
            clock,
            interval,
            cycles_completed: 0,
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Runs cycles until shutdown is signalled or a fatal error occurs.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), ScrapeError> {
        info!(
            interval_seconds = self.interval.as_secs(),
            targets = self.targets.len(),
            "Entering metrics refresh loop."
        );
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) => debug!(
                    cycle = self.cycles_completed,
                    series_updated = report.series_updated,
                    failed_scrapes = report.failed_scrapes,
                    evicted = report.evicted,
                    "Scrape cycle finished."
                ),
                Err(e) => {
                    error!("Stopping refresh loop: {}", e);
                    return Err(e);
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    break;
                }
                _ = self.clock.sleep(self.interval) => {}
            }
        }
        info!("Refresh loop received shutdown signal.");
        Ok(())
    }

    /// Scrapes every target once, then sweeps all gauges with a single
    /// shared `now`. Returns an error only for fatal failures.
    #[instrument(skip_all, fields(cycle = self.cycles_completed + 1))]
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ScrapeError> {
        let started = self.clock.now();
        let mut report = CycleReport::default();

        for target in &self.targets {
            // One timestamp for everything this target yields in this cycle.
            let observed_at = self.clock.now();
            for kind in ScrapeKind::ALL {
                match self.scrape(target, kind, observed_at).await {
                    Ok(updated) => report.series_updated += updated,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(path = %target, command = %kind, "Skipping scrape this cycle: {}", e);
                        self.metrics.increment_scrape_failure(target, kind);
                        report.failed_scrapes += 1;
                    }
                }
            }
        }

        let now = self.clock.now();
        for family in self.gauges.families() {
            let evicted = family.sweep(now);
            if evicted > 0 {
                info!(metric = family.name(), evicted, "Removed stale series.");
            }
            self.metrics.record_evictions(family.name(), evicted);
            report.evicted += evicted;
        }

        self.metrics.scrape_iterations_total.increment(1);
        self.metrics
            .scrape_duration_seconds
            .record(now.saturating_duration_since(started));
        self.cycles_completed += 1;
        Ok(report)
    }

    async fn scrape(
        &self,
        target: &str,
        kind: ScrapeKind,
        observed_at: Instant,
    ) -> Result<usize, ScrapeError> {
        let raw = self.invoke(kind.args(target)).await?;
        let updated = match kind {
            ScrapeKind::DeviceStats => {
                let samples = parse_device_stats(&raw, target)?;
                for (labels, value) in &samples {
                    self.gauges.device_stat.set(labels.clone(), *value, observed_at);
                }
                samples.len()
            }
            ScrapeKind::FilesystemUsage => {
                let samples = parse_filesystem_usage(&raw, target)?;
                for (labels, value) in &samples {
                    self.gauges
                        .filesystem_usage
                        .set(labels.clone(), *value, observed_at);
                }
                samples.len()
            }
        };
        Ok(updated)
    }

    /// Runs `btrfs` and returns its stdout when the call succeeded with
    /// output. The first cycle logs calls and raw output at debug level.
    async fn invoke(&self, args: Vec<String>) -> Result<String, ScrapeError> {
        let first_cycle = self.cycles_completed == 0;
        if first_cycle {
            debug!(?args, "Output of the first scraping iteration: call");
        } else {
            trace!(?args, "Calling btrfs");
        }

        let output = self.runner.run(&args).await?;
        if !output.success() {
            let stderr = match output.stderr.trim() {
                "" => "not set",
                text => text,
            };
            return Err(ScrapeError::NonZeroExit {
                exit_code: output.exit_code,
                stderr: stderr.to_string(),
            });
        }
        if output.stdout.trim().is_empty() {
            return Err(ScrapeError::EmptyOutput);
        }

        if first_cycle {
            debug!(result = %output.stdout, "Output of the first scraping iteration: result");
        }
        Ok(output.stdout)
    }
}
