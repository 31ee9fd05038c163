//! YouTube Data API v3 locator
//!
//! Only the two read calls the selector needs are implemented: `search.list`
//! restricted to completed live events, and `videos.list` for `contentDetails`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::auth::{Credential, TokenProvider};
use super::{ContentLocator, SearchItem, SourceError, SourceResult};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: Option<String>,
}

// ============================================================================
// Locator
// ============================================================================

/// Content locator backed by the YouTube Data API
pub struct YouTubeLocator {
    client: Client,
    base_url: String,
    credentials: Arc<dyn TokenProvider>,
}

impl YouTubeLocator {
    /// Create a locator against the public API
    pub fn new(credentials: Arc<dyn TokenProvider>, timeout: Duration) -> SourceResult<Self> {
        Self::with_base_url("https://www.googleapis.com/youtube/v3", credentials, timeout)
    }

    /// Create a locator with a custom base URL (used for testing with mock servers)
    pub fn with_base_url(
        base_url: &str,
        credentials: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> SourceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn authorized(&self, builder: RequestBuilder) -> SourceResult<RequestBuilder> {
        Ok(match self.credentials.credential().await? {
            Credential::Bearer(token) => builder.bearer_auth(token),
            Credential::ApiKey(key) => builder.query(&[("key", key)]),
        })
    }

    async fn get_json<T>(&self, endpoint: &str, query: &[(&str, String)]) -> SourceResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{endpoint}", self.base_url);
        let request = self.authorized(self.client.get(&url).query(query)).await?;

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ContentLocator for YouTubeLocator {
    async fn search_completed(
        &self,
        channel_id: &str,
        page_size: u32,
    ) -> SourceResult<Vec<SearchItem>> {
        let query = [
            ("part", String::from("id,snippet")),
            ("channelId", channel_id.to_string()),
            ("type", String::from("video")),
            ("eventType", String::from("completed")),
            ("order", String::from("date")),
            ("maxResults", page_size.min(50).to_string()),
        ];

        let response: SearchResponse = self.get_json("search", &query).await?;

        let items: Vec<SearchItem> = response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                Some(SearchItem::new(id, item.snippet.title, item.snippet.published_at))
            })
            .collect();

        tracing::info!(channel = %channel_id, count = items.len(), "Found completed live streams");
        Ok(items)
    }

    async fn declared_duration(&self, id: &str) -> SourceResult<Option<String>> {
        let query = [
            ("part", String::from("contentDetails")),
            ("id", id.to_string()),
        ];

        let response: VideoListResponse = self.get_json("videos", &query).await?;

        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|video| video.content_details.duration))
    }
}
