//! Common test utilities
//!
//! In-memory stand-ins for the content locator, the retrieval tool and the
//! transcoder, plus a builder wiring them into a scheduler.

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use rebroadcast::broadcast::{BroadcastProcess, Broadcaster, LaunchError, StopOutcome};
use rebroadcast::config::Config;
use rebroadcast::fetcher::{ArtifactFetcher, FetchError, Retriever};
use rebroadcast::models::LocalArtifact;
use rebroadcast::scheduler::{Pipeline, RotationEvent, RotationScheduler, RotationTiming};
use rebroadcast::selector::{CandidateSelector, SelectionPolicy};
use rebroadcast::source::{ContentLocator, SearchItem, SourceError};
use rebroadcast::storage::{ArtifactStore, RetentionCleaner};

pub const CHANNEL_ID: &str = "UC_test_channel";

// ============================================================================
// Content locator
// ============================================================================

/// Locator serving a fixed list of items with fixed declared durations
#[derive(Default)]
pub struct FakeLocator {
    items: Vec<(SearchItem, Option<String>)>,
    failing: bool,
    answers: Option<usize>,
    pub searches: AtomicUsize,
    pub duration_queries: AtomicUsize,
}

impl FakeLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator whose search always fails with a server error
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Add an item published at `published_at` declaring `duration` (ISO-8601)
    pub fn with_item(mut self, id: &str, published_at: &str, duration: &str) -> Self {
        self.items.push((
            SearchItem::new(id, format!("Live {id}"), published_at),
            Some(duration.to_string()),
        ));
        self
    }

    /// Serve the items for the first `n` searches only, then nothing
    pub fn answering(mut self, n: usize) -> Self {
        self.answers = Some(n);
        self
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn duration_queries(&self) -> usize {
        self.duration_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentLocator for FakeLocator {
    async fn search_completed(
        &self,
        channel_id: &str,
        _page_size: u32,
    ) -> Result<Vec<SearchItem>, SourceError> {
        let search = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(channel_id, CHANNEL_ID);

        if self.failing {
            return Err(SourceError::Status {
                status: 503,
                body: String::from("backendError"),
            });
        }

        if matches!(self.answers, Some(limit) if search > limit) {
            return Ok(Vec::new());
        }

        Ok(self.items.iter().map(|(item, _)| item.clone()).collect())
    }

    async fn declared_duration(&self, id: &str) -> Result<Option<String>, SourceError> {
        self.duration_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .iter()
            .find(|(item, _)| item.id == id)
            .and_then(|(_, duration)| duration.clone()))
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Retriever that fails a fixed number of times before writing the file
pub struct FakeRetriever {
    failures_left: AtomicUsize,
    leaves_partial: bool,
    pub calls: AtomicUsize,
    pub call_times: Mutex<Vec<Instant>>,
}

impl FakeRetriever {
    /// Always succeeds
    pub fn new() -> Self {
        Self::failing_times(0)
    }

    /// Fails the first `n` calls
    pub fn failing_times(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            leaves_partial: false,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Never succeeds
    pub fn broken() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// Write half a file before failing, like an interrupted download
    pub fn leaving_partials(mut self) -> Self {
        self.leaves_partial = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive calls
    pub fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, _url: &str, output: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
            }
            if self.leaves_partial {
                tokio::fs::write(output, b"half").await?;
            }
            return Err(FetchError::ToolFailed {
                status: String::from("exit status: 1"),
                detail: String::from("ERROR: unable to download video data: HTTP Error 403"),
            });
        }

        tokio::fs::write(output, b"ftypisom fake video payload").await?;
        Ok(())
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// How the fake transcoder behaves once started
#[derive(Debug, Clone, Copy)]
pub struct ProcessBehavior {
    /// Exit on its own after this long; `None` runs until stopped
    pub exits_after: Option<Duration>,
    /// Whether a terminate request ends it within the grace period
    pub honours_terminate: bool,
}

impl Default for ProcessBehavior {
    fn default() -> Self {
        Self {
            exits_after: None,
            honours_terminate: true,
        }
    }
}

/// Broadcaster producing [`FakeProcess`] handles
pub struct FakeBroadcaster {
    behavior: ProcessBehavior,
    probed: Option<Duration>,
    pub starts: AtomicUsize,
    pub started: Mutex<Vec<LocalArtifact>>,
}

impl FakeBroadcaster {
    pub fn new(behavior: ProcessBehavior, probed: Option<Duration>) -> Self {
        Self {
            behavior,
            probed,
            starts: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broadcaster for FakeBroadcaster {
    async fn start(
        &self,
        artifact: &LocalArtifact,
    ) -> Result<Box<dyn BroadcastProcess>, LaunchError> {
        rebroadcast::broadcast::validate_artifact(&artifact.path).await?;

        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(artifact.clone());

        Ok(Box::new(FakeProcess {
            exit_at: self.behavior.exits_after.map(|after| Instant::now() + after),
            honours_terminate: self.behavior.honours_terminate,
            exited: false,
        }))
    }

    async fn probe_duration(&self, _artifact: &LocalArtifact) -> Option<Duration> {
        self.probed
    }
}

/// Timer-driven stand-in for the transcoder process
pub struct FakeProcess {
    exit_at: Option<Instant>,
    honours_terminate: bool,
    exited: bool,
}

#[async_trait]
impl BroadcastProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        (!self.exited).then_some(4242)
    }

    fn is_alive(&mut self) -> bool {
        if matches!(self.exit_at, Some(at) if Instant::now() >= at) {
            self.exited = true;
        }
        !self.exited
    }

    async fn wait_exit(&mut self) -> Option<i32> {
        match self.exit_at {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.exited = true;
                Some(1)
            }
            None => std::future::pending().await,
        }
    }

    async fn stop(&mut self, grace: Duration) -> StopOutcome {
        if !self.is_alive() {
            return StopOutcome::AlreadyExited;
        }

        if self.honours_terminate {
            self.exited = true;
            return StopOutcome::Terminated;
        }

        tokio::time::sleep(grace).await;
        self.exited = true;
        StopOutcome::Killed
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Selection policy for [`CHANNEL_ID`] with the default window and threshold
pub fn test_policy() -> SelectionPolicy {
    let mut config = Config::default();
    config.source.channel_id = CHANNEL_ID.to_string();
    SelectionPolicy::from_config(&config)
}

/// Fetcher over `dir` with 3 attempts and a 5 s backoff
pub fn test_fetcher(dir: &Path, retriever: Arc<FakeRetriever>) -> ArtifactFetcher {
    let store = ArtifactStore::new(dir).unwrap();
    ArtifactFetcher::new(store, retriever, 3, Duration::from_secs(5))
}

/// Scheduler with default timing wired to the fakes
pub fn test_scheduler(
    dir: &Path,
    locator: Arc<FakeLocator>,
    retriever: Arc<FakeRetriever>,
    broadcaster: Arc<FakeBroadcaster>,
) -> RotationScheduler {
    let selector = CandidateSelector::with_seed(locator, test_policy(), 7);
    let fetcher = test_fetcher(dir, retriever);
    let cleaner = RetentionCleaner::new(dir, Duration::from_secs(24 * 3600));
    let pipeline = Arc::new(Pipeline::new(selector, fetcher, cleaner));

    RotationScheduler::new(pipeline, broadcaster, RotationTiming::default())
}

/// Write a file in `dir` whose mtime lies `age` in the past
pub fn write_aged(dir: &Path, name: &str, age: Duration) {
    let path = dir.join(name);
    std::fs::write(&path, b"old payload").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

/// Receive events until one matches `stop`, returning everything seen
pub async fn collect_until(
    events: &mut tokio::sync::broadcast::Receiver<RotationEvent>,
    stop: impl Fn(&RotationEvent) -> bool,
) -> Vec<RotationEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.expect("event channel closed");
        let done = stop(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Receive the remaining events until the channel closes or `Stopped` arrives
pub async fn drain(
    events: &mut tokio::sync::broadcast::Receiver<RotationEvent>,
) -> Vec<RotationEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.recv().await {
        let stopped = matches!(event, RotationEvent::Stopped);
        seen.push(event);
        if stopped {
            break;
        }
    }
    seen
}
