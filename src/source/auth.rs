//! Credentials for the content source API
//!
//! The interactive consent flow happens outside this program; we only consume the
//! authorized-user token file it leaves behind and keep the access token fresh
//! with the stored refresh token.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Access tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors that prevent producing a credential
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token file does not exist
    #[error("Token file not found: {}", .0.display())]
    MissingTokenFile(PathBuf),

    /// Token file could not be read or parsed
    #[error("Invalid token file {}: {reason}", .path.display())]
    InvalidTokenFile { path: PathBuf, reason: String },

    /// Token expired and cannot be refreshed
    #[error("Access token expired and no refresh token is available")]
    NoRefreshToken,

    /// Token endpoint rejected the refresh
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// HTTP failure while talking to the token endpoint
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// How a request to the content source is authorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// OAuth access token sent as `Authorization: Bearer`
    Bearer(String),
    /// API key sent as the `key` query parameter
    ApiKey(String),
}

/// Source of credentials for the locator
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce a credential that is valid right now
    async fn credential(&self) -> Result<Credential, AuthError>;
}

/// Static API key
#[derive(Debug, Clone)]
pub struct ApiKey(pub String);

#[async_trait]
impl TokenProvider for ApiKey {
    async fn credential(&self) -> Result<Credential, AuthError> {
        Ok(Credential::ApiKey(self.0.clone()))
    }
}

/// Authorized-user token file as written by the Google auth libraries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// Remaining fields (scopes, universe_domain, ...) preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    String::from("https://oauth2.googleapis.com/token")
}

impl StoredToken {
    /// Whether the access token must be refreshed before use at `now`
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry
                .checked_sub_signed(ChronoDuration::seconds(EXPIRY_MARGIN_SECS))
                .map_or(true, |refresh_at| refresh_at <= now),
            None => false,
        }
    }
}

/// Expiry `secs` after `now`; `None` when the lifetime is out of range
fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token file backed provider with refresh-on-expiry
pub struct TokenFile {
    path: PathBuf,
    client: Client,
    token: Mutex<StoredToken>,
}

impl TokenFile {
    /// Load the token file at `path`
    pub fn load(path: impl AsRef<Path>, client: Client) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(AuthError::MissingTokenFile(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| AuthError::InvalidTokenFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let token: StoredToken =
            serde_json::from_str(&content).map_err(|e| AuthError::InvalidTokenFile {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "Loaded credentials from token file");

        Ok(Self {
            path,
            client,
            token: Mutex::new(token),
        })
    }

    async fn refresh(&self, token: &mut StoredToken) -> Result<(), AuthError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        tracing::info!("Credentials expired, refreshing");

        let mut form = vec![
            ("grant_type", String::from("refresh_token")),
            ("refresh_token", refresh_token),
        ];
        if let Some(id) = &token.client_id {
            form.push(("client_id", id.clone()));
        }
        if let Some(secret) = &token.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.client.post(&token.token_uri).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!("{status}: {body}")));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        token.token = refreshed.access_token;
        let now = Utc::now();
        token.expiry = refreshed.expires_in.and_then(|secs| {
            let expiry = expiry_after(now, secs);
            if expiry.is_none() {
                tracing::warn!(expires_in = secs, "Ignoring out-of-range token lifetime");
            }
            expiry
        });

        self.persist(token).await;
        tracing::info!("Successfully refreshed credentials");
        Ok(())
    }

    /// Write the refreshed token back; a failed write only costs a refresh next start
    async fn persist(&self, token: &StoredToken) {
        let serialized = match serde_json::to_string_pretty(token) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize refreshed token");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&self.path, serialized).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to save token file");
        } else {
            tracing::debug!(path = %self.path.display(), "Saved credentials to token file");
        }
    }
}

#[async_trait]
impl TokenProvider for TokenFile {
    async fn credential(&self) -> Result<Credential, AuthError> {
        let mut token = self.token.lock().await;
        if token.needs_refresh(Utc::now()) {
            self.refresh(&mut token).await?;
        }
        Ok(Credential::Bearer(token.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_token(dir: &Path, json: serde_json::Value) -> PathBuf {
        let path = dir.join("token.json");
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_missing_token_file() {
        let result = TokenFile::load("/nonexistent/token.json", Client::new());
        assert!(matches!(result, Err(AuthError::MissingTokenFile(_))));
    }

    #[test]
    fn test_needs_refresh() {
        let now = Utc::now();
        let mut token: StoredToken =
            serde_json::from_value(serde_json::json!({ "token": "abc" })).unwrap();
        assert!(!token.needs_refresh(now));

        token.expiry = Some(now + ChronoDuration::seconds(30));
        assert!(token.needs_refresh(now));

        token.expiry = Some(now + ChronoDuration::hours(1));
        assert!(!token.needs_refresh(now));

        token.expiry = Some(DateTime::<Utc>::MIN_UTC);
        assert!(token.needs_refresh(now));
    }

    #[test]
    fn test_expiry_after() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 3600), Some(now + ChronoDuration::hours(1)));
        assert_eq!(expiry_after(now, i64::MAX), None);
        assert_eq!(expiry_after(now, i64::MIN), None);
    }

    #[tokio::test]
    async fn test_valid_token_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let expiry = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
        let path = write_token(
            dir.path(),
            serde_json::json!({ "token": "fresh", "expiry": expiry }),
        );

        let provider = TokenFile::load(&path, Client::new()).unwrap();
        let credential = provider.credential().await.unwrap();
        assert_eq!(credential, Credential::Bearer(String::from("fresh")));
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "renewed",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = write_token(
            dir.path(),
            serde_json::json!({
                "token": "stale",
                "refresh_token": "refresh",
                "token_uri": format!("{}/token", server.uri()),
                "client_id": "id",
                "client_secret": "secret",
                "scopes": ["https://www.googleapis.com/auth/youtube"],
                "expiry": "2020-01-01T00:00:00Z"
            }),
        );

        let provider = TokenFile::load(&path, Client::new()).unwrap();
        let credential = provider.credential().await.unwrap();
        assert_eq!(credential, Credential::Bearer(String::from("renewed")));

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["token"], "renewed");
        assert!(saved["scopes"].is_array());
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_means_no_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "renewed",
                "expires_in": i64::MAX
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = write_token(
            dir.path(),
            serde_json::json!({
                "token": "stale",
                "refresh_token": "refresh",
                "token_uri": format!("{}/token", server.uri()),
                "expiry": "2020-01-01T00:00:00Z"
            }),
        );

        let provider = TokenFile::load(&path, Client::new()).unwrap();
        let credential = provider.credential().await.unwrap();
        assert_eq!(credential, Credential::Bearer(String::from("renewed")));

        // No expiry means no second refresh
        provider.credential().await.unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(saved["expiry"].is_null());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_token(
            dir.path(),
            serde_json::json!({ "token": "stale", "expiry": "2020-01-01T00:00:00Z" }),
        );

        let provider = TokenFile::load(&path, Client::new()).unwrap();
        let result = provider.credential().await;
        assert!(matches!(result, Err(AuthError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = write_token(
            dir.path(),
            serde_json::json!({
                "token": "stale",
                "refresh_token": "revoked",
                "token_uri": format!("{}/token", server.uri()),
                "expiry": "2020-01-01T00:00:00Z"
            }),
        );

        let provider = TokenFile::load(&path, Client::new()).unwrap();
        match provider.credential().await {
            Err(AuthError::RefreshFailed(msg)) => assert!(msg.contains("invalid_grant")),
            other => panic!("Unexpected result: {other:?}"),
        }
    }
}
