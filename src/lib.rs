/// btrfs-exporter - republishes btrfs statistics as Prometheus metrics
///
/// The library holds the stale-aware gauge registry, the btrfs invocation and
/// parsing glue, the refresh loop that ties them together, and the HTTP
/// endpoint serving the result.
pub mod app;
pub mod btrfs;
pub mod cli;
pub mod clock;
pub mod config;
pub mod internal_metrics;
pub mod refresh;
pub mod registry;
pub mod task_manager;
