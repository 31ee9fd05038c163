//! Artifact acquisition
//!
//! This module turns a [`Candidate`] into a complete file in the local artifact
//! store, with features including:
//! - Idempotence: an artifact already on disk is returned without retrieval
//! - Bounded retries with a fixed backoff between attempts
//! - Cleanup of partial files after every failed attempt
//!
//! The actual download is delegated to a [`Retriever`]; [`ytdlp::YtDlpRetriever`]
//! drives the `yt-dlp` tool.

pub mod ytdlp;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::FetchConfig;
use crate::error::RebroadcastErrorTrait;
use crate::models::{Candidate, LocalArtifact};
use crate::storage::ArtifactStore;
use crate::utils::format_bytes;
use crate::utils::retry::{with_retry, RetryConfig};

pub use ytdlp::YtDlpRetriever;

/// Errors raised while acquiring an artifact
#[derive(Error, Debug)]
pub enum FetchError {
    /// The retrieval tool could not be started
    #[error("Failed to launch retrieval tool: {0}")]
    Spawn(#[source] io::Error),

    /// The retrieval tool ran but reported failure
    #[error("Retrieval tool exited with {status}: {detail}")]
    ToolFailed { status: String, detail: String },

    /// The retrieval tool reported success but wrote nothing
    #[error("Retrieval produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    /// Filesystem error in the artifact store
    #[error("Artifact store error: {0}")]
    Io(#[from] io::Error),

    /// Every attempt failed
    #[error("Download failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Downloads the media behind a source URL to a local path
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Write the media at `url` to `output`
    ///
    /// On error the caller removes whatever was written.
    async fn retrieve(&self, url: &str, output: &Path) -> Result<(), FetchError>;
}

/// Guarantees a usable local artifact for a candidate
pub struct ArtifactFetcher {
    store: ArtifactStore,
    retriever: Arc<dyn Retriever>,
    retry: RetryConfig,
}

impl ArtifactFetcher {
    /// Create a fetcher
    ///
    /// # Arguments
    ///
    /// * `store` - Artifact store the file lands in
    /// * `retriever` - Download backend
    /// * `max_attempts` - Total retrieval attempts per fetch
    /// * `backoff` - Fixed delay between attempts
    pub fn new(
        store: ArtifactStore,
        retriever: Arc<dyn Retriever>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            retriever,
            retry: RetryConfig::fixed(max_attempts, backoff),
        }
    }

    /// Create a fetcher from the fetch section of the config
    pub fn from_config(
        store: ArtifactStore,
        retriever: Arc<dyn Retriever>,
        config: &FetchConfig,
    ) -> Self {
        Self::new(
            store,
            retriever,
            config.max_retries,
            Duration::from_secs(config.retry_backoff_secs),
        )
    }

    /// Acquire the artifact for `candidate`, or `None` once every attempt failed
    pub async fn fetch(&self, candidate: &Candidate) -> Option<LocalArtifact> {
        match self.try_fetch(candidate).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::error!(
                    id = %candidate.id,
                    category = %e.category(),
                    error = %e,
                    "Failed to download video"
                );
                None
            }
        }
    }

    /// Acquire the artifact for `candidate`
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Exhausted` carrying the last failure when no attempt
    /// produced a complete artifact. No partial file is left behind in that case.
    pub async fn try_fetch(&self, candidate: &Candidate) -> Result<LocalArtifact, FetchError> {
        let id = candidate.id.as_str();

        if let Some(artifact) = self.store.existing(id).await {
            tracing::info!(
                id = %id,
                path = %artifact.path.display(),
                "Video already downloaded"
            );
            return Ok(artifact);
        }

        // Leftovers from an interrupted earlier run
        self.store.discard_partials(id).await;

        let staging = self.store.staging_path(id);
        tracing::info!(id = %id, url = %candidate.url, "Downloading video");

        let result = with_retry(&self.retry, |attempt| {
            let staging = &staging;
            async move {
                tracing::info!(
                    id = %id,
                    attempt = attempt + 1,
                    max_attempts = self.retry.max_attempts,
                    "Download attempt"
                );

                let outcome = self.attempt(&candidate.url, id, staging).await;
                if outcome.is_err() {
                    self.store.discard_partials(id).await;
                }
                outcome
            }
        })
        .await;

        match result {
            Ok(artifact) => {
                tracing::info!(
                    id = %id,
                    path = %artifact.path.display(),
                    size = %format_bytes(artifact.size),
                    "Download completed successfully"
                );
                Ok(artifact)
            }
            Err(e) => Err(FetchError::Exhausted {
                attempts: self.retry.max_attempts.max(1),
                last: e.to_string(),
            }),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        id: &str,
        staging: &Path,
    ) -> Result<LocalArtifact, FetchError> {
        self.retriever.retrieve(url, staging).await?;

        self.store.commit(id).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                FetchError::MissingOutput(staging.to_path_buf())
            } else {
                FetchError::Io(e)
            }
        })
    }
}
