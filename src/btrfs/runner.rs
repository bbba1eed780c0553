//! Spawning the external `btrfs` tool.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Captured result of one finished invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("the '{program}' program cannot be found; maybe it still needs to be installed")]
    ToolNotFound { program: String },
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Runs the storage tool with the given arguments.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, CommandError>;
}

/// Runs a real executable as a child process.
#[derive(Debug, Clone)]
pub struct BtrfsCommand {
    program: String,
    timeout: Option<Duration>,
}

impl BtrfsCommand {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl CommandRunner for BtrfsCommand {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    program: self.program.clone(),
                    timeout,
                })?,
            None => command.output().await,
        };

        let output = output.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CommandError::ToolNotFound {
                    program: self.program.clone(),
                }
            } else {
                CommandError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            }
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_binary_is_tool_not_found() {
        let runner = BtrfsCommand::new("btrfs-exporter-no-such-binary", None);
        let err = runner.run(&args(&["device", "stats", "/"])).await.unwrap_err();

        assert!(matches!(err, CommandError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let runner = BtrfsCommand::new("sh", None);
        let output = runner
            .run(&args(&["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = BtrfsCommand::new("sleep", Some(Duration::from_millis(50)));
        let err = runner.run(&args(&["5"])).await.unwrap_err();

        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
