//! External collaborator execution.
//!
//! Collector, validator and the subprocess supervisor are all opaque
//! programs: the only thing read back is the exit code. Their stdout and
//! stderr go straight to ours.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::StageConfig;
use crate::error::{Result, TickloopError};

/// Exit code reported when a child was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Runs a stage and reports its exit code.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `stage` to completion.
    ///
    /// `Err` means the process could not be run at all (spawn failure,
    /// timeout); callers treat it the same as a nonzero exit.
    async fn run(&self, stage: &StageConfig) -> Result<i32>;
}

/// [`ProcessRunner`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    workdir: Option<std::path::PathBuf>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run children in `dir` instead of the current directory.
    pub fn in_dir(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(&self, stage: &StageConfig) -> Result<i32> {
        let Some((exe, args)) = stage.command.split_first() else {
            return Err(TickloopError::Process(format!(
                "stage {} has empty command",
                stage.name
            )));
        };

        let start = Instant::now();
        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            TickloopError::Process(format!("failed to spawn {} ({exe}): {e}", stage.name))
        })?;

        let status = if stage.timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(stage.timeout_secs), child.wait()).await
            {
                Ok(status) => status?,
                Err(_) => {
                    // kill_on_drop reaps the child when `child` goes out of scope.
                    return Err(TickloopError::Timeout {
                        stage: stage.name.clone(),
                        seconds: stage.timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await?
        };

        let exit_code = status.code().unwrap_or(SIGNALLED_EXIT_CODE);
        debug!(
            stage = %stage.name,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "stage process exited"
        );
        Ok(exit_code)
    }
}
