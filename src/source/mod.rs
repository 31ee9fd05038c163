//! Content source access
//!
//! The rotation engine only needs two questions answered by the content source:
//! which recorded live streams a channel has completed, and how long a given one
//! is. [`ContentLocator`] is that boundary; [`youtube::YouTubeLocator`] answers it
//! with the YouTube Data API and [`auth`] supplies the credentials it sends.

pub mod auth;
pub mod youtube;

use async_trait::async_trait;
use thiserror::Error;

pub use auth::{ApiKey, AuthError, Credential, TokenFile, TokenProvider};
pub use youtube::YouTubeLocator;

/// Result type for content source queries
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised while querying the content source
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Credentials could not be produced
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// One completed live stream as listed by the content source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    /// Publication timestamp as reported (ISO-8601 UTC)
    pub published_at: String,
}

impl SearchItem {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        published_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            published_at: published_at.into(),
        }
    }
}

/// Query interface to the external content locator
#[async_trait]
pub trait ContentLocator: Send + Sync {
    /// List recently completed live streams of a channel, newest first
    async fn search_completed(&self, channel_id: &str, page_size: u32)
        -> SourceResult<Vec<SearchItem>>;

    /// Declared duration (ISO-8601, e.g. `PT7H2M`) of one item, if the source knows it
    async fn declared_duration(&self, id: &str) -> SourceResult<Option<String>>;
}
