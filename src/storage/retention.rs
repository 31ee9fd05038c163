//! Age-based eviction of local artifacts
//!
//! Broadcast does not delete its artifact; files stay on disk until a sweep
//! finds them older than the retention threshold.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,
    /// Files deleted for being older than the threshold
    pub removed: usize,
    /// Files that could not be inspected or deleted
    pub failed: usize,
}

/// Deletes artifacts whose age exceeds a threshold
#[derive(Debug, Clone)]
pub struct RetentionCleaner {
    dir: PathBuf,
    max_age: Duration,
}

impl RetentionCleaner {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Sweep relative to the current wall clock
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweep treating `now` as the current time
    ///
    /// Never fails: per-file errors are counted and logged, and a missing
    /// directory yields an empty report.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "Artifact directory does not exist");
                return report;
            }
            Err(e) => {
                tracing::error!(dir = %self.dir.display(), error = %e, "Error cleaning up old files");
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read directory entry");
                    report.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read file metadata");
                    report.failed += 1;
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }
            report.scanned += 1;

            let age = match metadata.modified() {
                // mtime in the future counts as brand new
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "File has no modification time");
                    report.failed += 1;
                    continue;
                }
            };

            if age <= self.max_age {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(
                        path = %path.display(),
                        age_hours = age.as_secs() / 3600,
                        "Removed old file"
                    );
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove old file");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "Retention sweep finished"
        );
        report
    }
}
