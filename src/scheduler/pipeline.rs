//! Select-and-fetch stages shared by the main loop and the prefetch task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::event::RotationEvent;
use super::wait_for_shutdown;
use crate::fetcher::ArtifactFetcher;
use crate::models::PreparedItem;
use crate::selector::CandidateSelector;
use crate::storage::RetentionCleaner;

/// The selector, fetcher and cleaner the scheduler sequences
pub struct Pipeline {
    pub selector: CandidateSelector,
    pub fetcher: ArtifactFetcher,
    pub cleaner: RetentionCleaner,
}

impl Pipeline {
    pub fn new(
        selector: CandidateSelector,
        fetcher: ArtifactFetcher,
        cleaner: RetentionCleaner,
    ) -> Self {
        Self {
            selector,
            fetcher,
            cleaner,
        }
    }

    /// Select a candidate and acquire its artifact
    pub async fn prepare(&self) -> Option<PreparedItem> {
        let candidate = self.selector.select().await?;
        let artifact = self.fetcher.fetch(&candidate).await?;
        Some(PreparedItem {
            candidate,
            artifact,
        })
    }
}

/// Spawn the background preparation of the next item
///
/// Sleeps `delay`, prepares one item, then runs a retention sweep whatever
/// the outcome. The handle is the only way the result reaches the scheduler;
/// the task runs to completion even if the broadcast that spawned it ends first.
pub fn spawn_prefetch(
    pipeline: Arc<Pipeline>,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
    events: broadcast::Sender<RotationEvent>,
) -> JoinHandle<Option<PreparedItem>> {
    let span = tracing::info_span!("prefetch");

    tokio::spawn(
        async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => return None,
            }

            tracing::info!("Preparing next video");
            let prepared = pipeline.prepare().await;

            match &prepared {
                Some(item) => {
                    tracing::info!(id = %item.candidate.id, "Next video prepared");
                    let _ = events.send(RotationEvent::NextPrepared {
                        id: item.candidate.id.clone(),
                    });
                }
                None => tracing::warn!("Failed to prepare next video"),
            }

            let report = pipeline.cleaner.sweep().await;
            let _ = events.send(RotationEvent::RetentionSwept { report });
            prepared
        }
        .instrument(span),
    )
}
