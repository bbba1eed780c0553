//! # Internal Metrics Module
//!
//! Counters and histograms describing the exporter itself, recorded through
//! the `metrics` facade into a `PrometheusRecorder`.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: creates an app-local Prometheus recorder and the
//!   `Metrics` handle registered against it. The recorder is never installed
//!   globally, so several exporters (or tests) can live in one process.
//!
//! - **`Metrics`**: cloneable handles the refresh loop updates.
//!
//! - **`MetricsServer`**: (defined in `server.rs`) the `axum` server that
//!   serves `/metrics`, combining the recorder output with the stale-aware
//!   btrfs gauges.

use crate::btrfs::{ScrapeKind, DEVICE_STAT_METRIC, FILESYSTEM_USAGE_METRIC};
use anyhow::Result;
use metrics::{Counter, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod server;

pub const SCRAPE_ITERATIONS_METRIC: &str = "smart_prom_scrape_iterations_total";

/// The public API for the exporter's own metrics.
#[derive(Clone)]
pub struct Metrics {
    pub scrape_iterations_total: Counter,
    pub scrape_duration_seconds: Histogram,
    scrape_failures: Arc<BTreeMap<(String, ScrapeKind), Counter>>,
    evicted_series: Arc<BTreeMap<&'static str, Counter>>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Describes every metric and registers handles with the current
    /// recorder. Labeled handles are created up front for each monitored
    /// path, since the target set is fixed at startup.
    ///
    /// Outside of any recorder the handles are no-ops, which is what most
    /// tests want.
    pub fn new(targets: &BTreeSet<String>) -> Self {
        metrics::describe_counter!(
            SCRAPE_ITERATIONS_METRIC,
            Unit::Count,
            "Total number of SMART scrape iterations."
        );
        metrics::describe_counter!(
            "btrfs_scrape_failures_total",
            Unit::Count,
            "Total number of btrfs invocations whose output could not be used, labeled by path and command."
        );
        metrics::describe_counter!(
            "btrfs_series_evicted_total",
            Unit::Count,
            "Total number of series removed because they were not refreshed within their time-to-live."
        );
        metrics::describe_histogram!(
            "btrfs_scrape_duration_seconds",
            Unit::Seconds,
            "Duration of one full scrape cycle over all monitored paths."
        );

        let scrape_failures = targets
            .iter()
            .flat_map(|path| ScrapeKind::ALL.map(|kind| (path.clone(), kind)))
            .map(|(path, kind)| {
                let counter = metrics::counter!(
                    "btrfs_scrape_failures_total",
                    "path" => path.clone(),
                    "command" => kind.as_str()
                );
                ((path, kind), counter)
            })
            .collect();

        let evicted_series = [DEVICE_STAT_METRIC, FILESYSTEM_USAGE_METRIC]
            .into_iter()
            .map(|name| {
                (
                    name,
                    metrics::counter!("btrfs_series_evicted_total", "metric" => name),
                )
            })
            .collect();

        Self {
            scrape_iterations_total: metrics::counter!(SCRAPE_ITERATIONS_METRIC),
            scrape_duration_seconds: metrics::histogram!("btrfs_scrape_duration_seconds"),
            scrape_failures: Arc::new(scrape_failures),
            evicted_series: Arc::new(evicted_series),
        }
    }

    /// Counts one failed sub-scrape of a monitored path.
    pub fn increment_scrape_failure(&self, path: &str, kind: ScrapeKind) {
        if let Some(counter) = self.scrape_failures.get(&(path.to_string(), kind)) {
            counter.increment(1);
        }
    }

    /// Adds the number of series a sweep removed from `metric`.
    pub fn record_evictions(&self, metric: &str, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(counter) = self.evicted_series.get(metric) {
            counter.increment(count as u64);
        }
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder<'a> {
    targets: &'a BTreeSet<String>,
}

impl<'a> MetricsBuilder<'a> {
    pub fn new(targets: &'a BTreeSet<String>) -> Self {
        Self { targets }
    }

    /// Creates the recorder and returns the `Metrics` handles together with
    /// the `PrometheusHandle` used to render them.
    pub fn build(self) -> Result<(Metrics, PrometheusHandle)> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
            )?
            .build_recorder();
        let handle = recorder.handle();
        let metrics = metrics::with_local_recorder(&recorder, || Metrics::new(self.targets));
        Ok((metrics, handle))
    }
}
