//! Broadcast control
//!
//! Launches the external transcoder for a local artifact and supervises it
//! until it exits or is stopped. Liveness is the process exit status; the
//! transcoder's log output is drained for diagnostics only and never parsed.
//!
//! # Modules
//!
//! - [`ffmpeg`] - `ffmpeg` command line and the [`FfmpegBroadcaster`]
//! - [`probe`] - `ffprobe` queries for playable duration and audio presence
//! - [`process`] - [`ProcessHandle`], a supervised child process

pub mod ffmpeg;
pub mod probe;
pub mod process;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::LocalArtifact;

pub use ffmpeg::{AudioSource, FfmpegBroadcaster};
pub use probe::MediaProbe;
pub use process::ProcessHandle;

/// Errors raised while launching a broadcast
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The artifact path does not exist
    #[error("Video file not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// The artifact exists but holds no data
    #[error("Video file is empty: {}", .0.display())]
    EmptyArtifact(PathBuf),

    /// The transcoder could not be started
    #[error("Failed to start transcoder: {0}")]
    Spawn(#[source] io::Error),
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The process had already exited on its own
    AlreadyExited,
    /// The process exited within the grace period after the terminate request
    Terminated,
    /// The grace period elapsed and the process was killed
    Killed,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExited => write!(f, "already exited"),
            Self::Terminated => write!(f, "terminated"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// A running broadcast process
#[async_trait]
pub trait BroadcastProcess: Send {
    /// OS process id, if the process is still known to the OS
    fn id(&self) -> Option<u32>;

    /// Whether the process is still running
    fn is_alive(&mut self) -> bool;

    /// Wait until the process exits on its own; returns its exit code if any
    ///
    /// Must be cancel safe: it is raced against timers in `tokio::select!`.
    async fn wait_exit(&mut self) -> Option<i32>;

    /// Ask the process to terminate, killing it if it is still running after `grace`
    async fn stop(&mut self, grace: Duration) -> StopOutcome;
}

/// Starts broadcasts and answers questions about artifacts
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Launch the transcoder pushing `artifact` to the broadcast endpoint
    async fn start(
        &self,
        artifact: &LocalArtifact,
    ) -> Result<Box<dyn BroadcastProcess>, LaunchError>;

    /// Playable duration of the artifact, if it can be determined
    async fn probe_duration(&self, artifact: &LocalArtifact) -> Option<Duration>;
}

/// Check that an artifact is present and non-empty before launch
///
/// Returns the current size in bytes.
pub async fn validate_artifact(path: &Path) -> Result<u64, LaunchError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => return Err(LaunchError::MissingArtifact(path.to_path_buf())),
    };

    if !metadata.is_file() {
        return Err(LaunchError::MissingArtifact(path.to_path_buf()));
    }

    if metadata.len() == 0 {
        return Err(LaunchError::EmptyArtifact(path.to_path_buf()));
    }

    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_missing() {
        let result = validate_artifact(Path::new("/nonexistent/video.mp4")).await;
        assert!(matches!(result, Err(LaunchError::MissingArtifact(_))));
    }

    #[tokio::test]
    async fn test_validate_empty_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");

        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            validate_artifact(&path).await,
            Err(LaunchError::EmptyArtifact(_))
        ));

        std::fs::write(&path, b"data").unwrap();
        assert_eq!(validate_artifact(&path).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_validate_directory_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_artifact(dir.path()).await;
        assert!(matches!(result, Err(LaunchError::MissingArtifact(_))));
    }
}
