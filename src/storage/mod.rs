//! Local artifact store
//!
//! A flat directory of media files named after the candidate identifier.
//! Retrieval writes to a staging name and is renamed into place only once
//! complete, so `<id>.mp4` is either absent or a finished artifact.

pub mod retention;

use std::io;
use std::path::PathBuf;

use crate::models::LocalArtifact;

pub use retention::{RetentionCleaner, SweepReport};

/// Extension of finished artifacts
pub const ARTIFACT_EXT: &str = "mp4";

/// Marker inserted before the extension while a retrieval is in progress
pub const STAGING_MARKER: &str = "part";

/// Flat directory of artifacts keyed by identifier
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Canonical path of the finished artifact for `id`
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{ARTIFACT_EXT}", file_stem(id)))
    }

    /// Path the retrieval tool writes to before the artifact is committed
    pub fn staging_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{STAGING_MARKER}.{ARTIFACT_EXT}", file_stem(id)))
    }

    /// Return the finished artifact for `id` if one is on disk
    ///
    /// A zero-length file at the canonical path is not playable; it is removed
    /// and reported as absent.
    pub async fn existing(&self, id: &str) -> Option<LocalArtifact> {
        let path = self.artifact_path(id);
        let artifact = LocalArtifact::from_path(&path).await.ok()?;

        if artifact.size == 0 {
            tracing::warn!(path = %path.display(), "Removing empty artifact");
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove empty artifact");
            }
            return None;
        }

        Some(artifact)
    }

    /// Move a completed staging file to the canonical path
    pub async fn commit(&self, id: &str) -> io::Result<LocalArtifact> {
        let staging = self.staging_path(id);
        let target = self.artifact_path(id);

        let metadata = tokio::fs::metadata(&staging).await?;
        if metadata.len() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("staging file is empty: {}", staging.display()),
            ));
        }

        tokio::fs::rename(&staging, &target).await?;
        tracing::debug!(path = %target.display(), "Artifact committed");

        LocalArtifact::from_path(target).await
    }

    /// Remove every partial file left by a retrieval of `id`
    ///
    /// Covers the staging file itself and the intermediate pieces the retrieval
    /// tool derives from its name (`<id>.part.mp4.part`, `<id>.part.f137.mp4`, ...).
    /// Returns the number of files removed.
    pub async fn discard_partials(&self, id: &str) -> usize {
        let prefix = format!("{}.{STAGING_MARKER}", file_stem(id));
        let mut removed = 0;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to list artifact directory");
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) {
                continue;
            }

            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed partial file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
                }
            }
        }

        removed
    }
}

/// Filesystem-safe stem for an identifier
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
