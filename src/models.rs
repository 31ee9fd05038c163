// Core data structures for the rotation engine

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

/// A content item selected for broadcast, pending acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String, // Content-source identifier (e.g., YouTube video id)
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub declared_duration: Option<Duration>, // Filled in after the duration query
}

impl Candidate {
    /// Create a candidate without a declared duration
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            published_at,
            declared_duration: None,
        }
    }

    /// Watch URL for a YouTube video id
    pub fn youtube_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={id}")
    }

    /// Return a copy carrying the declared duration
    #[must_use]
    pub fn with_declared_duration(mut self, duration: Duration) -> Self {
        self.declared_duration = Some(duration);
        self
    }
}

/// A complete media file on local disk for a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl LocalArtifact {
    /// Read size and mtime for an existing file
    pub async fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
            path,
        })
    }
}

/// A candidate together with its acquired artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedItem {
    pub candidate: Candidate,
    pub artifact: LocalArtifact,
}

/// Parse an ISO-8601 time duration (`PT#H#M#S`) into seconds
///
/// Malformed input parses to 0, matching how the content source is treated:
/// an unreadable duration never passes a minimum-duration filter.
pub fn parse_iso8601_duration(value: &str) -> u64 {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();

    let re = DURATION_RE.get_or_init(|| {
        Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("Invalid regex pattern")
    });

    let Some(caps) = re.captures(value.trim()) else {
        tracing::warn!(duration = %value, "Failed to parse duration");
        return 0;
    };

    let total = [(1, 3600), (2, 60), (3, 1)]
        .into_iter()
        .try_fold(0u64, |acc, (group, unit): (usize, u64)| {
            let amount = match caps.get(group) {
                Some(m) => m.as_str().parse::<u64>().ok()?,
                None => 0,
            };
            amount.checked_mul(unit)?.checked_add(acc)
        });

    let Some(total) = total else {
        tracing::warn!(duration = %value, "Duration out of range");
        return 0;
    };
    tracing::debug!(duration = %value, seconds = total, "Parsed duration");
    total
}
