//! Command-Line Interface (CLI) argument parsing.
//!
//! Flags given on the command line take precedence over the TOML file and
//! the environment. They are merged into the configuration through the
//! `figment::Provider` implementation below.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Exports btrfs device error counters and filesystem usage for Prometheus.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port of the metrics endpoint.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Seconds between two scrape cycles.
    #[arg(long, value_name = "SECONDS")]
    pub refresh_interval: Option<u64>,

    /// A btrfs mount point to monitor. May be given several times.
    #[arg(short = 'p', long = "monitor-path", value_name = "PATH")]
    pub monitor_paths: Vec<String>,

    /// The logging filter, e.g. "info" or "btrfs_exporter=debug".
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(port) = self.port {
            dict.insert("port".into(), Value::from(port));
        }

        if let Some(interval) = self.refresh_interval {
            dict.insert("refresh_interval_seconds".into(), Value::from(interval));
        }

        if !self.monitor_paths.is_empty() {
            dict.insert(
                "monitor_paths".into(),
                Value::from(self.monitor_paths.clone()),
            );
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
