//! Configuration management for btrfs-exporter
//!
//! The `Config` struct is assembled with `figment` from, in increasing
//! precedence: built-in defaults, an optional TOML file, `BTRFS_EXPORTER_*`
//! environment variables, the well-known exporter variables
//! (`PROMETHEUS_METRIC_PORT`, `BTRFS_INFO_READ_INTERVAL_SECONDS`,
//! `BTRFS_MONITOR_PATH_<n>`), and finally command-line flags.

use crate::btrfs::TTL_INTERVAL_MULTIPLIER;
use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Monitor paths are read from `BTRFS_MONITOR_PATH_0` up to this bound
/// (exclusive). Gaps in the numbering are allowed.
pub const MAX_MONITOR_PATHS: usize = 100;

pub const MONITOR_PATH_ENV_PREFIX: &str = "BTRFS_MONITOR_PATH_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("refresh_interval_seconds must be greater than zero")]
    ZeroRefreshInterval,
    #[error("command_timeout_seconds must be greater than zero when set")]
    ZeroCommandTimeout,
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging filter for the application.
    pub log_level: String,
    /// Address the metrics endpoint binds to.
    pub listen_address: IpAddr,
    /// Port of the metrics endpoint.
    pub port: u16,
    /// Seconds between two scrape cycles. Series expire after four intervals.
    pub refresh_interval_seconds: u64,
    /// Mount points to monitor. Duplicates collapse.
    #[serde(default)]
    pub monitor_paths: BTreeSet<String>,
    /// The btrfs executable, resolved through `PATH` unless absolute.
    pub btrfs_binary: String,
    /// Upper bound for a single btrfs invocation. Unbounded when unset.
    #[serde(default)]
    pub command_timeout_seconds: Option<u64>,
}

impl Config {
    /// Loads the configuration by layering all sources and validates it.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed("BTRFS_EXPORTER_"))
            .merge(
                Env::raw()
                    .only(&["PROMETHEUS_METRIC_PORT", "BTRFS_INFO_READ_INTERVAL_SECONDS"])
                    .map(|key| {
                        if key.as_str().eq_ignore_ascii_case("PROMETHEUS_METRIC_PORT") {
                            "port".into()
                        } else {
                            "refresh_interval_seconds".into()
                        }
                    }),
            )
            // Paths from the numbered variables and the CLI add to the set
            // instead of replacing it.
            .admerge(Serialized::default(
                "monitor_paths",
                monitor_paths_from_env(),
            ))
            .admerge(cli.clone())
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_seconds == 0 {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        if self.command_timeout_seconds == Some(0) {
            return Err(ConfigError::ZeroCommandTimeout);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// How long a series survives without being refreshed.
    pub fn series_ttl(&self) -> Duration {
        self.refresh_interval() * TTL_INTERVAL_MULTIPLIER
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }
}

/// Collects the values of `BTRFS_MONITOR_PATH_0` .. `BTRFS_MONITOR_PATH_99`.
/// Blank values are ignored.
pub fn monitor_paths_from_env() -> Vec<String> {
    (0..MAX_MONITOR_PATHS)
        .filter_map(|i| std::env::var(format!("{MONITOR_PATH_ENV_PREFIX}{i}")).ok())
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9902,
            refresh_interval_seconds: 60,
            monitor_paths: BTreeSet::new(),
            btrfs_binary: "btrfs".to_string(),
            command_timeout_seconds: None,
        }
    }
}
