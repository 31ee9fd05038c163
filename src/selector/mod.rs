//! Candidate selection
//!
//! One call to [`CandidateSelector::select`] yields at most one candidate:
//!
//! 1. list the channel's completed live streams,
//! 2. keep those published inside the morning window (reference timezone),
//! 3. pick one uniformly at random,
//! 4. reject it if its declared duration is below the minimum.
//!
//! Picking at random rather than the newest item keeps the rotation from
//! replaying the same recording cycle after cycle. A rejected pick is not
//! replaced within the same call; the scheduler backs off and asks again.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::RebroadcastErrorTrait;
use crate::models::{parse_iso8601_duration, Candidate};
use crate::source::{ContentLocator, SearchItem};
use crate::utils::format_hm;

/// Eligibility rules applied to search results
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub channel_id: String,
    pub page_size: u32,
    /// Eligible publication hours `[start_hour, end_hour)`
    pub start_hour: u32,
    pub end_hour: u32,
    pub reference_offset: FixedOffset,
    pub min_duration: Duration,
}

impl SelectionPolicy {
    /// Build the policy from the selection and source sections of the config
    pub fn from_config(config: &Config) -> Self {
        let offset_secs = config.selection.utc_offset_hours * 3600;
        Self {
            channel_id: config.source.channel_id.clone(),
            page_size: config.source.page_size,
            start_hour: config.selection.start_hour,
            end_hour: config.selection.end_hour,
            reference_offset: FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix()),
            min_duration: config.min_duration(),
        }
    }

    /// Publication hour of a timestamp in the reference timezone
    pub fn publication_hour(&self, published_at: &DateTime<Utc>) -> u32 {
        published_at.with_timezone(&self.reference_offset).hour()
    }

    /// Whether a publication time falls inside the morning window
    pub fn in_window(&self, published_at: &DateTime<Utc>) -> bool {
        let hour = self.publication_hour(published_at);
        self.start_hour <= hour && hour < self.end_hour
    }

    /// Convert search items into eligible candidates, skipping unparsable timestamps
    pub fn eligible(&self, items: Vec<SearchItem>) -> Vec<Candidate> {
        items
            .into_iter()
            .filter_map(|item| {
                let published_at = match DateTime::parse_from_rfc3339(&item.published_at) {
                    Ok(dt) => dt.with_timezone(&Utc),
                    Err(e) => {
                        tracing::warn!(
                            id = %item.id,
                            published_at = %item.published_at,
                            error = %e,
                            "Skipping item with unreadable publication time"
                        );
                        return None;
                    }
                };

                tracing::debug!(title = %item.title, published_at = %published_at, "Checking item");

                self.in_window(&published_at).then(|| {
                    let url = Candidate::youtube_url(&item.id);
                    Candidate::new(item.id, url, item.title, published_at)
                })
            })
            .collect()
    }
}

/// Selects one eligible broadcast candidate per call
pub struct CandidateSelector {
    locator: Arc<dyn ContentLocator>,
    policy: SelectionPolicy,
    rng: Mutex<ChaCha8Rng>,
}

impl CandidateSelector {
    /// Create a selector seeded from OS entropy
    pub fn new(locator: Arc<dyn ContentLocator>, policy: SelectionPolicy) -> Self {
        Self {
            locator,
            policy,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Create a selector with a fixed seed for reproducible picks
    pub fn with_seed(locator: Arc<dyn ContentLocator>, policy: SelectionPolicy, seed: u64) -> Self {
        Self {
            locator,
            policy,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    /// Pick one eligible candidate, or `None` when nothing qualifies this time
    pub async fn select(&self) -> Option<Candidate> {
        tracing::info!("Starting search for eligible live streams");

        let items = match self
            .locator
            .search_completed(&self.policy.channel_id, self.policy.page_size)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(
                    category = %e.category(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Error searching for live streams"
                );
                return None;
            }
        };

        let candidates = self.policy.eligible(items);
        if candidates.is_empty() {
            tracing::warn!(
                start_hour = self.policy.start_hour,
                end_hour = self.policy.end_hour,
                "No morning live streams found"
            );
            return None;
        }

        tracing::info!(count = candidates.len(), "Found potential morning live streams");

        let picked = self.pick(candidates)?;
        tracing::info!(id = %picked.id, title = %picked.title, "Selected random live stream");

        let declared = match self.locator.declared_duration(&picked.id).await {
            Ok(Some(raw)) => Duration::from_secs(parse_iso8601_duration(&raw)),
            Ok(None) => {
                tracing::warn!(id = %picked.id, "Content source returned no duration");
                Duration::ZERO
            }
            Err(e) => {
                tracing::error!(
                    id = %picked.id,
                    category = %e.category(),
                    error = %e,
                    "Error fetching stream duration"
                );
                return None;
            }
        };

        tracing::info!(id = %picked.id, duration = %format_hm(declared), "Live stream duration");

        if declared < self.policy.min_duration {
            tracing::warn!(
                id = %picked.id,
                min_secs = self.policy.min_duration.as_secs(),
                "Live stream duration too short"
            );
            return None;
        }

        tracing::info!(id = %picked.id, "Live stream meets all criteria");
        Some(picked.with_declared_duration(declared))
    }

    fn pick(&self, candidates: Vec<Candidate>) -> Option<Candidate> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        candidates.choose(&mut *rng).cloned()
    }
}
