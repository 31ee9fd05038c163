//! rebroadcast - Unattended rotation of archived live streams
//!
//! Finds completed live broadcasts of a channel, downloads one, streams it to an
//! RTMP endpoint in real time, and keeps the rotation going indefinitely while
//! preparing the next item in the background.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`source`] - Content locator API client and credentials
//! - [`selector`] - Eligibility rules and random candidate choice
//! - [`fetcher`] - Idempotent artifact download with retries
//! - [`broadcast`] - Transcoder process launch and supervision
//! - [`storage`] - Local artifact store and retention sweep
//! - [`scheduler`] - The rotation state machine
//! - [`logging`] - Log file output alongside the console
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use rebroadcast::config::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     println!("Broadcasting to {}", config.broadcast.ingest_url);
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod selector;
pub mod source;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broadcast::{BroadcastProcess, Broadcaster, FfmpegBroadcaster, StopOutcome};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, RebroadcastErrorTrait, Result};
    pub use crate::fetcher::{ArtifactFetcher, Retriever, YtDlpRetriever};
    pub use crate::models::{Candidate, LocalArtifact, PreparedItem};
    pub use crate::scheduler::{Phase, Pipeline, RotationEvent, RotationScheduler, RotationTiming};
    pub use crate::selector::{CandidateSelector, SelectionPolicy};
    pub use crate::source::{ContentLocator, YouTubeLocator};
    pub use crate::storage::{ArtifactStore, RetentionCleaner};
}

// Direct re-exports for convenience
pub use models::{Candidate, LocalArtifact, PreparedItem};
