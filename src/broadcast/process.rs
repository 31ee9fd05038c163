//! Supervised child process

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::{BroadcastProcess, LaunchError, StopOutcome};
use crate::utils::lines::OutputLines;

/// Handle to a running transcoder process
///
/// The child's stderr is drained line by line into DEBUG logs by a background
/// task that keeps reading until the stream closes, so the child never blocks
/// or loses its pipe while writing diagnostics. The child is killed if the handle is
/// dropped while it is still running.
pub struct ProcessHandle {
    child: Child,
    label: String,
    drain: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawn `command`, wiring stderr to the drain task
    pub fn spawn(mut command: Command, label: impl Into<String>) -> Result<Self, LaunchError> {
        let label = label.into();

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(LaunchError::Spawn)?;

        let drain = child.stderr.take().map(|stderr| {
            let label = label.clone();
            tokio::spawn(async move {
                OutputLines::new(stderr)
                    .for_each(|line| tracing::debug!(process = %label, "{line}"))
                    .await;
                tracing::debug!(process = %label, "Output stream closed");
            })
        });

        tracing::info!(process = %label, pid = ?child.id(), "Process started");

        Ok(Self { child, label, drain })
    }

    /// Send the polite termination request
    fn request_terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: kill(2) with a pid we spawned and have not yet reaped
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc == 0 {
                    return;
                }
                tracing::warn!(
                    process = %self.label,
                    error = %std::io::Error::last_os_error(),
                    "SIGTERM failed, killing instead"
                );
            }
        }

        if let Err(e) = self.child.start_kill() {
            tracing::warn!(process = %self.label, error = %e, "Failed to signal process");
        }
    }
}

#[async_trait]
impl BroadcastProcess for ProcessHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn wait_exit(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(process = %self.label, error = %e, "Failed to wait for process");
                None
            }
        }
    }

    async fn stop(&mut self, grace: Duration) -> StopOutcome {
        if !self.is_alive() {
            return StopOutcome::AlreadyExited;
        }

        tracing::info!(process = %self.label, grace_secs = grace.as_secs(), "Stopping process");
        self.request_terminate();

        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => StopOutcome::Terminated,
            Err(_) => {
                tracing::warn!(process = %self.label, "Process did not exit in time, killing");
                if let Err(e) = self.child.kill().await {
                    tracing::error!(process = %self.label, error = %e, "Failed to kill process");
                }
                StopOutcome::Killed
            }
        };

        if let Some(drain) = self.drain.take() {
            // Bounded: the pipe closes once the child is gone
            let _ = tokio::time::timeout(Duration::from_secs(1), drain).await;
        }

        tracing::info!(process = %self.label, outcome = %outcome, "Process stopped");
        outcome
    }
}
