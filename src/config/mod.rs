//! Configuration management for the rotation engine
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. All values have defaults and are fixed for the lifetime of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "REBROADCAST_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content source (locator API) configuration
    pub source: SourceConfig,

    /// Candidate eligibility rules
    pub selection: SelectionConfig,

    /// Artifact retrieval configuration
    pub fetch: FetchConfig,

    /// Transcoder and broadcast endpoint configuration
    pub broadcast: BroadcastConfig,

    /// Rotation loop timing
    pub rotation: RotationConfig,

    /// Local artifact store and retention
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Content source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Channel whose completed live streams are rebroadcast
    pub channel_id: String,

    /// Base URL of the Data API
    pub api_base_url: String,

    /// Authorized-user token file (OAuth)
    pub token_file: PathBuf,

    /// API key, used instead of the token file when set
    pub api_key: Option<String>,

    /// Number of search results requested per query (1-50)
    pub page_size: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            api_base_url: String::from("https://www.googleapis.com/youtube/v3"),
            token_file: PathBuf::from("token.json"),
            api_key: None,
            page_size: 50,
            request_timeout_secs: 30,
        }
    }
}

/// Eligibility rules for candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// First eligible publication hour (inclusive)
    pub start_hour: u32,

    /// Last eligible publication hour (exclusive)
    pub end_hour: u32,

    /// Offset of the reference timezone from UTC, in hours
    pub utc_offset_hours: i32,

    /// Minimum declared duration in seconds
    pub min_duration_secs: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            start_hour: 2,
            end_hour: 11,
            utc_offset_hours: 0,
            min_duration_secs: 6 * 3600,
        }
    }
}

/// Artifact retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Retrieval attempts per fetch
    pub max_retries: u32,

    /// Fixed delay between attempts in seconds
    pub retry_backoff_secs: u64,

    /// Path or name of the yt-dlp executable
    pub ytdlp_path: String,

    /// Retry count passed to yt-dlp itself
    pub ytdlp_retries: u32,

    /// yt-dlp format preference
    pub format: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_secs: 5,
            ytdlp_path: String::from("yt-dlp"),
            ytdlp_retries: 3,
            format: String::from("bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"),
        }
    }
}

/// Transcoder and endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// RTMP ingest URL without the stream key
    pub ingest_url: String,

    /// Stream key appended to the ingest URL
    pub stream_key: String,

    /// Nominal source frame rate
    pub frame_rate: u32,

    /// Keyframe interval in frames
    pub keyframe_interval: u32,

    /// Path or name of the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path or name of the ffprobe executable
    pub ffprobe_path: String,

    /// Audio codec for the re-encoded track
    pub audio_codec: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ingest_url: String::from("rtmp://a.rtmp.youtube.com/live2"),
            stream_key: String::new(),
            frame_rate: 30,
            keyframe_interval: 60,
            ffmpeg_path: String::from("ffmpeg"),
            ffprobe_path: String::from("ffprobe"),
            audio_codec: String::from("aac"),
        }
    }
}

/// Rotation loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Delay after broadcast start before preparing the next item
    pub prefetch_delay_secs: u64,

    /// Liveness poll interval while broadcasting
    pub poll_interval_secs: u64,

    /// Backoff after a failed step
    pub cycle_backoff_secs: u64,

    /// Grace period between terminate and kill
    pub stop_grace_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            prefetch_delay_secs: 600,
            poll_interval_secs: 30,
            cycle_backoff_secs: 60,
            stop_grace_secs: 10,
        }
    }
}

/// Local artifact store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Flat directory holding downloaded artifacts
    pub artifact_dir: PathBuf,

    /// Files older than this are evicted by the retention sweep
    pub retention_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("./downloads"),
            retention_secs: 24 * 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Append logs to this file as well as the console
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
            file: None,
        }
    }
}

/// Read and parse an environment variable, keeping `current` when unset or unparsable
fn env_or<T: FromStr>(key: &str, current: T) -> T {
    match std::env::var(format!("{ENV_PREFIX}{key}")) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "Ignoring unparsable environment override");
                current
            }
        },
        Err(_) => current,
    }
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `REBROADCAST_*` environment overrides
    pub fn apply_env(&mut self) {
        let source = &mut self.source;
        source.channel_id = env_or("CHANNEL_ID", std::mem::take(&mut source.channel_id));
        source.api_base_url = env_or("API_BASE_URL", std::mem::take(&mut source.api_base_url));
        source.token_file = env_or("TOKEN_FILE", std::mem::take(&mut source.token_file));
        if let Ok(key) = std::env::var(format!("{ENV_PREFIX}API_KEY")) {
            source.api_key = Some(key);
        }
        source.page_size = env_or("PAGE_SIZE", source.page_size);

        let selection = &mut self.selection;
        selection.start_hour = env_or("START_HOUR", selection.start_hour);
        selection.end_hour = env_or("END_HOUR", selection.end_hour);
        selection.utc_offset_hours = env_or("UTC_OFFSET_HOURS", selection.utc_offset_hours);
        selection.min_duration_secs = env_or("MIN_DURATION_SECS", selection.min_duration_secs);

        let fetch = &mut self.fetch;
        fetch.max_retries = env_or("MAX_RETRIES", fetch.max_retries);
        fetch.retry_backoff_secs = env_or("RETRY_BACKOFF_SECS", fetch.retry_backoff_secs);
        fetch.ytdlp_path = env_or("YTDLP_PATH", std::mem::take(&mut fetch.ytdlp_path));

        let broadcast = &mut self.broadcast;
        broadcast.ingest_url = env_or("INGEST_URL", std::mem::take(&mut broadcast.ingest_url));
        broadcast.stream_key = env_or("STREAM_KEY", std::mem::take(&mut broadcast.stream_key));
        broadcast.frame_rate = env_or("FRAME_RATE", broadcast.frame_rate);
        broadcast.keyframe_interval = env_or("KEYFRAME_INTERVAL", broadcast.keyframe_interval);
        broadcast.ffmpeg_path = env_or("FFMPEG_PATH", std::mem::take(&mut broadcast.ffmpeg_path));
        broadcast.ffprobe_path =
            env_or("FFPROBE_PATH", std::mem::take(&mut broadcast.ffprobe_path));

        let rotation = &mut self.rotation;
        rotation.prefetch_delay_secs = env_or("PREFETCH_DELAY_SECS", rotation.prefetch_delay_secs);
        rotation.poll_interval_secs = env_or("POLL_INTERVAL_SECS", rotation.poll_interval_secs);
        rotation.cycle_backoff_secs = env_or("CYCLE_BACKOFF_SECS", rotation.cycle_backoff_secs);
        rotation.stop_grace_secs = env_or("STOP_GRACE_SECS", rotation.stop_grace_secs);

        let storage = &mut self.storage;
        storage.artifact_dir = env_or("ARTIFACT_DIR", std::mem::take(&mut storage.artifact_dir));
        storage.retention_secs = env_or("RETENTION_SECS", storage.retention_secs);

        let logging = &mut self.logging;
        logging.level = env_or("LOG_LEVEL", std::mem::take(&mut logging.level));
        logging.format = env_or("LOG_FORMAT", std::mem::take(&mut logging.format));
        if let Ok(path) = std::env::var(format!("{ENV_PREFIX}LOG_FILE")) {
            logging.file = (!path.is_empty()).then(|| PathBuf::from(path));
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let selection = &self.selection;
        if selection.end_hour > 24 {
            anyhow::bail!("selection.end_hour must be at most 24");
        }

        if selection.start_hour >= selection.end_hour {
            anyhow::bail!("selection.start_hour must be lower than selection.end_hour");
        }

        if !(-12..=14).contains(&selection.utc_offset_hours) {
            anyhow::bail!("selection.utc_offset_hours must be between -12 and 14");
        }

        if !(1..=50).contains(&self.source.page_size) {
            anyhow::bail!("source.page_size must be between 1 and 50");
        }

        if self.fetch.max_retries == 0 {
            anyhow::bail!("fetch.max_retries must be greater than 0");
        }

        if self.broadcast.frame_rate == 0 || self.broadcast.keyframe_interval == 0 {
            anyhow::bail!("broadcast.frame_rate and broadcast.keyframe_interval must be positive");
        }

        if self.rotation.poll_interval_secs == 0 {
            anyhow::bail!("rotation.poll_interval_secs must be greater than 0");
        }

        if self.storage.artifact_dir.as_os_str().is_empty() {
            anyhow::bail!("storage.artifact_dir must not be empty");
        }

        Ok(())
    }

    /// Complete RTMP target including the stream key
    #[must_use]
    pub fn broadcast_target(&self) -> String {
        format!(
            "{}/{}",
            self.broadcast.ingest_url.trim_end_matches('/'),
            self.broadcast.stream_key
        )
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.source.request_timeout_secs)
    }

    /// Minimum declared duration as Duration
    #[must_use]
    pub fn min_duration(&self) -> Duration {
        Duration::from_secs(self.selection.min_duration_secs)
    }

    /// Retention threshold as Duration
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_secs)
    }
}

impl RotationConfig {
    pub fn prefetch_delay(&self) -> Duration {
        Duration::from_secs(self.prefetch_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cycle_backoff(&self) -> Duration {
        Duration::from_secs(self.cycle_backoff_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.selection.start_hour, 2);
        assert_eq!(config.selection.end_hour, 11);
        assert_eq!(config.min_duration(), Duration::from_secs(6 * 3600));
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.rotation.prefetch_delay(), Duration::from_secs(600));
        assert_eq!(config.retention(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_invalid_window() {
        let mut config = Config::default();
        config.selection.start_hour = 11;
        config.selection.end_hour = 11;
        assert!(config.validate().is_err());

        config.selection.start_hour = 5;
        config.selection.end_hour = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_page_size() {
        let mut config = Config::default();
        config.source.page_size = 51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = Config::default();
        config.fetch.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broadcast_target() {
        let mut config = Config::default();
        config.broadcast.stream_key = String::from("abcd-1234");
        assert_eq!(
            config.broadcast_target(),
            "rtmp://a.rtmp.youtube.com/live2/abcd-1234"
        );

        config.broadcast.ingest_url = String::from("rtmp://localhost/live/");
        assert_eq!(config.broadcast_target(), "rtmp://localhost/live/abcd-1234");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [selection]
            start_hour = 4

            [broadcast]
            stream_key = "key"
            "#,
        )
        .unwrap();

        assert_eq!(config.selection.start_hour, 4);
        assert_eq!(config.selection.end_hour, 11);
        assert_eq!(config.broadcast.stream_key, "key");
        assert_eq!(config.broadcast.keyframe_interval, 60);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_log_file_setting() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            file = "/var/log/rebroadcast.log"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.logging.file.as_deref(),
            Some(Path::new("/var/log/rebroadcast.log"))
        );
        assert_eq!(config.logging.level, "info");
    }
}
