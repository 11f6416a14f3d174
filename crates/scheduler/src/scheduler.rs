//! Deferred one-shot job scheduling.
//!
//! [`OneShotScheduler`] is the seam; [`AtScheduler`] delegates the actual
//! timing to the OS `at(1)` facility, so the scheduled command runs
//! out-of-process at its time regardless of this process's lifetime. The
//! only work done here is parsing the job id out of the submission output
//! and mapping `atrm`'s "Cannot find jobid" onto already-resolved success.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use stock_track_core::JobHandle;

/// Errors from scheduling or cancelling a deferred job.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The scheduling binary could not be invoked.
    #[error("failed to invoke {command}: {source}")]
    Spawn {
        /// The binary that failed to start.
        command: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The facility rejected the submission.
    #[error("job submission rejected: {stderr}")]
    Rejected {
        /// What the facility printed.
        stderr: String,
    },

    /// The submission was accepted but no job id could be parsed.
    #[error("no job id in scheduler output: {output:?}")]
    MissingJobId {
        /// The full submission output.
        output: String,
    },

    /// Cancellation failed for a reason other than the job being gone.
    #[error("cancel failed for job {handle}: {stderr}")]
    CancelFailed {
        /// The handle being cancelled.
        handle: JobHandle,
        /// What the facility printed.
        stderr: String,
    },
}

/// Schedules and cancels one-shot deferred jobs.
#[async_trait]
pub trait OneShotScheduler: Send + Sync {
    /// Schedules `command` to run once, `delay` from now, and returns an
    /// opaque handle for later cancellation.
    async fn schedule(&self, delay: Duration, command: &str) -> Result<JobHandle, ScheduleError>;

    /// Cancels a previously scheduled job. Cancelling a job that already
    /// fired or never existed is success, not an error.
    async fn cancel(&self, handle: JobHandle) -> Result<(), ScheduleError>;
}

/// [`OneShotScheduler`] backed by the `at`/`atrm` commands.
#[derive(Debug, Clone, Default)]
pub struct AtScheduler;

impl AtScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OneShotScheduler for AtScheduler {
    async fn schedule(&self, delay: Duration, command: &str) -> Result<JobHandle, ScheduleError> {
        // at(1) has minute granularity; round up so a short delay still
        // lands in the future.
        let minutes = delay.as_secs().div_ceil(60).max(1);
        let when = format!("now + {minutes} minutes");

        let mut child = Command::new("at")
            .arg(&when)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ScheduleError::Spawn {
                command: "at".to_string(),
                source,
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(command.as_bytes())
                .await
                .map_err(|source| ScheduleError::Spawn {
                    command: "at".to_string(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ScheduleError::Spawn {
                command: "at".to_string(),
                source,
            })?;

        // at prints its confirmation (including the job id) on stderr.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(ScheduleError::Rejected {
                stderr: stderr.trim().to_string(),
            });
        }

        let combined = format!("{stdout}\n{stderr}");
        let handle = parse_job_id(&combined).ok_or(ScheduleError::MissingJobId {
            output: combined.trim().to_string(),
        })?;
        info!(%handle, %when, command, "scheduled deferred job");
        Ok(handle)
    }

    async fn cancel(&self, handle: JobHandle) -> Result<(), ScheduleError> {
        let output = Command::new("atrm")
            .arg(handle.to_string())
            .output()
            .await
            .map_err(|source| ScheduleError::Spawn {
                command: "atrm".to_string(),
                source,
            })?;

        if output.status.success() {
            info!(%handle, "cancelled deferred job");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Cannot find jobid") {
            // The job already fired or was removed; cancellation has
            // nothing left to do.
            debug!(%handle, "job already resolved, nothing to cancel");
            return Ok(());
        }

        Err(ScheduleError::CancelFailed {
            handle,
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Finds the token following the word `job` and parses it as a job id.
fn parse_job_id(output: &str) -> Option<JobHandle> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word == "job" {
            return words.next()?.parse::<u32>().ok().map(JobHandle);
        }
    }
    None
}
