//! Everything specific to the `btrfs` tool: how it is invoked, how its
//! output is parsed, and the gauges its values are published under.

pub mod device_stats;
pub mod filesystem_usage;
pub mod runner;

use crate::registry::{MetricDefinition, MetricFamily, StaleGauge};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use device_stats::parse_device_stats;
pub use filesystem_usage::parse_filesystem_usage;
pub use runner::{BtrfsCommand, CommandError, CommandOutput, CommandRunner};

pub const DEVICE_STAT_METRIC: &str = "btrfs_device_stat";
pub const FILESYSTEM_USAGE_METRIC: &str = "btrfs_filesystem_usage_bytes";

/// Series survive this many refresh intervals without an update, so three
/// consecutive failed scrapes do not make a device disappear.
pub const TTL_INTERVAL_MULTIPLIER: u32 = 4;

/// The per-device error counters reported by `btrfs device stats`.
pub const STAT_TYPES: [&str; 5] = [
    "write_io_errs",
    "read_io_errs",
    "flush_io_errs",
    "corruption_errs",
    "generation_errs",
];

/// Errors raised while parsing `btrfs` output.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid device stats JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("device stats output has no 'device-stats' array")]
    MissingDeviceStats,
    #[error("filesystem usage output contains neither 'Used' nor 'Free (estimated)'")]
    NoUsageFields,
}

/// The two sub-scrapes performed for every monitored path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScrapeKind {
    DeviceStats,
    FilesystemUsage,
}

impl ScrapeKind {
    pub const ALL: [ScrapeKind; 2] = [ScrapeKind::DeviceStats, ScrapeKind::FilesystemUsage];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeKind::DeviceStats => "device_stats",
            ScrapeKind::FilesystemUsage => "filesystem_usage",
        }
    }

    /// Arguments passed to the `btrfs` binary for this sub-scrape.
    pub fn args(&self, path: &str) -> Vec<String> {
        let args: &[&str] = match self {
            ScrapeKind::DeviceStats => &["--format", "json", "device", "stats"],
            ScrapeKind::FilesystemUsage => &["filesystem", "usage", "--raw"],
        };
        args.iter()
            .copied()
            .chain(std::iter::once(path))
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Display for ScrapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn device_stat_definition(ttl: Duration) -> MetricDefinition<4> {
    MetricDefinition {
        name: DEVICE_STAT_METRIC,
        help: "Btrfs device IO error statistics",
        label_names: ["device", "devid", "stat_type", "path"],
        ttl,
    }
}

pub fn filesystem_usage_definition(ttl: Duration) -> MetricDefinition<2> {
    MetricDefinition {
        name: FILESYSTEM_USAGE_METRIC,
        help: "Btrfs information about internal filesystem usage.",
        label_names: ["stat_type", "path"],
        ttl,
    }
}

/// The gauges published by the exporter. Cloning shares the same registries.
#[derive(Debug, Clone)]
pub struct BtrfsGauges {
    pub device_stat: Arc<StaleGauge<4>>,
    pub filesystem_usage: Arc<StaleGauge<2>>,
}

impl BtrfsGauges {
    /// Creates empty gauges whose TTL is derived from the refresh interval.
    pub fn new(refresh_interval: Duration) -> Self {
        let ttl = refresh_interval * TTL_INTERVAL_MULTIPLIER;
        Self {
            device_stat: Arc::new(StaleGauge::new(device_stat_definition(ttl))),
            filesystem_usage: Arc::new(StaleGauge::new(filesystem_usage_definition(ttl))),
        }
    }

    pub fn families(&self) -> Vec<Arc<dyn MetricFamily>> {
        vec![
            self.device_stat.clone() as Arc<dyn MetricFamily>,
            self.filesystem_usage.clone() as Arc<dyn MetricFamily>,
        ]
    }
}
