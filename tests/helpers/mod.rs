#![allow(dead_code)]
//! Shared fakes for the integration tests.

pub mod app;

use async_trait::async_trait;
use btrfs_exporter::btrfs::{CommandError, CommandOutput, CommandRunner};
use btrfs_exporter::clock::ManualClock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEVICE_STATS_SINGLE: &str = include_str!("../fixtures/device_stats_single.json");
pub const DEVICE_STATS_RAID: &str = include_str!("../fixtures/device_stats_raid.json");
pub const FILESYSTEM_USAGE: &str = include_str!("../fixtures/filesystem_usage.txt");

/// How the fake `btrfs` behaves for one monitored path.
#[derive(Debug, Clone)]
pub enum Script {
    /// Both sub-commands succeed with the given outputs.
    Healthy {
        device_stats: &'static str,
        usage: &'static str,
    },
    /// Both sub-commands exit with status 1.
    Failing,
    /// The binary cannot be found.
    ToolMissing,
}

/// A `CommandRunner` that answers from per-path scripts instead of spawning
/// processes. Scripts can be swapped while the exporter is running.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    clock: Option<(Arc<ManualClock>, Duration)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every invocation move `clock` forward by `per_call`, as a real
    /// process would take time to run.
    pub fn with_clock(mut self, clock: Arc<ManualClock>, per_call: Duration) -> Self {
        self.clock = Some((clock, per_call));
        self
    }

    pub fn script(&self, path: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), script);
    }

    pub fn healthy(&self, path: &str, device_stats: &'static str) {
        self.script(
            path,
            Script::Healthy {
                device_stats,
                usage: FILESYSTEM_USAGE,
            },
        );
    }

    /// Number of invocations that targeted `path`.
    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, CommandError> {
        if let Some((clock, per_call)) = &self.clock {
            clock.advance(*per_call);
        }

        let path = args.last().cloned().unwrap_or_default();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or(Script::Failing);

        match script {
            Script::Healthy {
                device_stats,
                usage,
            } => {
                let stdout = if args.iter().any(|arg| arg == "device") {
                    device_stats
                } else {
                    usage
                };
                Ok(CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    exit_code: Some(0),
                })
            }
            Script::Failing => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("ERROR: cannot access '{path}': No such file or directory"),
                exit_code: Some(1),
            }),
            Script::ToolMissing => Err(CommandError::ToolNotFound {
                program: "btrfs".to_string(),
            }),
        }
    }
}
