//! Rotation scheduling
//!
//! This module drives the unending broadcast rotation:
//!
//! ```text
//!  Idle ──▶ Selecting ──▶ Fetching ──▶ Broadcasting ──▶ Rotating ─┐
//!              ▲              ▲                                    │
//!              │              └──────── promoted next ◀────────────┤
//!              └──────────────────────── no next ◀─────────────────┘
//!
//!  any phase ──(shutdown)──▶ Stopped
//! ```
//!
//! While an item is on air, one prefetch task prepares the next item in the
//! background and hands it back through its `JoinHandle`. At most one such task
//! exists. A task that has not finished when its broadcast ends keeps running
//! (its retention sweep included) and is read by a later cycle. Results move
//! into `next` only when the task has finished and are promoted only in
//! `Rotating`, after the broadcast process is confirmed stopped, so `current`
//! is never reassigned while on air.
//!
//! # Modules
//!
//! - [`state`] - Phase and current/next slots
//! - [`pipeline`] - Selector, fetcher and cleaner plus the prefetch task
//! - [`event`] - Events broadcast to observers
//! - [`error`] - Scheduler error types

pub mod error;
pub mod event;
pub mod pipeline;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::broadcast::{BroadcastProcess, Broadcaster};
use crate::config::Config;
use crate::error::RebroadcastErrorTrait;
use crate::models::PreparedItem;
use crate::utils::format_hm;

pub use error::{SchedulerError, SchedulerResult};
pub use event::RotationEvent;
pub use pipeline::{spawn_prefetch, Pipeline};
pub use state::{Phase, RotationState};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Timing parameters of the rotation loop
#[derive(Debug, Clone)]
pub struct RotationTiming {
    /// Delay after broadcast start before preparing the next item
    pub prefetch_delay: Duration,
    /// Liveness poll interval while broadcasting
    pub poll_interval: Duration,
    /// Wait after a failed step or when nothing was prepared
    pub cycle_backoff: Duration,
    /// Grace period between terminate and kill
    pub stop_grace: Duration,
    /// Expected broadcast length when the artifact cannot be probed
    pub fallback_duration: Duration,
}

impl RotationTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefetch_delay: config.rotation.prefetch_delay(),
            poll_interval: config.rotation.poll_interval(),
            cycle_backoff: config.rotation.cycle_backoff(),
            stop_grace: config.rotation.stop_grace(),
            fallback_duration: config.min_duration(),
        }
    }
}

impl Default for RotationTiming {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Requests a graceful stop of the rotation
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal every waiting step to stop
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Resolve once shutdown has been requested
///
/// Never resolves if every shutdown handle is gone without signalling.
pub(crate) async fn wait_for_shutdown(receiver: &mut watch::Receiver<bool>) {
    let closed = receiver.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Why a cycle ended without error
enum CycleEnd {
    /// Broadcast finished; carries the promoted item, if any
    Rotated(Option<PreparedItem>),
    /// Shutdown was requested
    Shutdown,
}

/// Why supervision of the broadcast process ended
enum BroadcastEnd {
    Exited(Option<i32>),
    Deadline,
    Shutdown,
}

/// Drives select → fetch → broadcast → prefetch → rotate until stopped
pub struct RotationScheduler {
    pipeline: Arc<Pipeline>,
    broadcaster: Arc<dyn Broadcaster>,
    timing: RotationTiming,
    state: RotationState,
    prefetch: Option<JoinHandle<Option<PreparedItem>>>,
    events: broadcast::Sender<RotationEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl RotationScheduler {
    /// Create a new scheduler
    pub fn new(
        pipeline: Arc<Pipeline>,
        broadcaster: Arc<dyn Broadcaster>,
        timing: RotationTiming,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown) = watch::channel(false);

        Self {
            pipeline,
            broadcaster,
            timing,
            state: RotationState::new(),
            prefetch: None,
            events,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown,
        }
    }

    /// Subscribe to rotation events
    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.events.subscribe()
    }

    /// Handle that stops the loop from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn timing(&self) -> &RotationTiming {
        &self.timing
    }

    /// Run the rotation until shutdown is requested
    ///
    /// Failed steps are logged and followed by the cycle backoff; nothing
    /// short of shutdown ends the loop.
    pub async fn run(&mut self) {
        tracing::info!("Starting continuous streaming");

        let mut promoted: Option<PreparedItem> = None;
        let mut cycle: u64 = 0;

        while !self.is_shutdown() {
            cycle += 1;
            let span = tracing::info_span!("cycle", n = cycle);

            match self.run_cycle(promoted.take()).instrument(span).await {
                Ok(CycleEnd::Rotated(next)) => promoted = next,
                Ok(CycleEnd::Shutdown) => break,
                Err(e) => {
                    tracing::error!(
                        step = e.step(),
                        category = %e.category(),
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "Error in streaming cycle"
                    );
                    if !self.backoff(e.to_string()).await {
                        break;
                    }
                }
            }
        }

        self.abort_prefetch();
        self.state.discard_next();
        self.set_phase(Phase::Stopped);
        self.emit(RotationEvent::Stopped);
        tracing::info!("Streaming loop stopped");
    }

    async fn run_cycle(&mut self, promoted: Option<PreparedItem>) -> SchedulerResult<CycleEnd> {
        let candidate = match promoted {
            Some(item) => {
                tracing::info!(id = %item.candidate.id, "Starting promoted video");
                item.candidate
            }
            None => {
                self.set_phase(Phase::Selecting);
                let selected = tokio::select! {
                    selected = self.pipeline.selector.select() => selected,
                    _ = wait_for_shutdown(&mut self.shutdown) => return Ok(CycleEnd::Shutdown),
                };
                selected.ok_or(SchedulerError::NoCandidate)?
            }
        };

        self.emit(RotationEvent::CandidateSelected {
            id: candidate.id.clone(),
            title: candidate.title.clone(),
        });

        self.set_phase(Phase::Fetching);
        let fetched = tokio::select! {
            fetched = self.pipeline.fetcher.fetch(&candidate) => fetched,
            _ = wait_for_shutdown(&mut self.shutdown) => return Ok(CycleEnd::Shutdown),
        };
        let artifact = fetched.ok_or_else(|| SchedulerError::fetch_failed(&candidate.id))?;

        self.emit(RotationEvent::ArtifactReady {
            id: candidate.id.clone(),
            path: artifact.path.clone(),
            size: artifact.size,
        });

        self.set_phase(Phase::Broadcasting);
        let mut process = match self.broadcaster.start(&artifact).await {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(
                    id = %candidate.id,
                    category = %e.category(),
                    error = %e,
                    "Transcoder launch failed"
                );
                return Err(SchedulerError::launch_failed(&candidate.id, e.to_string()));
            }
        };

        let id = candidate.id.clone();
        if let Err(e) = self.state.go_on_air(PreparedItem {
            candidate,
            artifact: artifact.clone(),
        }) {
            process.stop(self.timing.stop_grace).await;
            return Err(e);
        }

        let expected = match self.broadcaster.probe_duration(&artifact).await {
            Some(duration) => duration,
            None => {
                tracing::warn!(
                    id = %id,
                    fallback = %format_hm(self.timing.fallback_duration),
                    "Could not determine video duration, using minimum"
                );
                self.timing.fallback_duration
            }
        };

        tracing::info!(id = %id, duration = %format_hm(expected), "Stream started");
        self.emit(RotationEvent::BroadcastStarted {
            id: id.clone(),
            expected,
        });

        self.start_prefetch().await;

        let started = Instant::now();
        let end = self.supervise(process.as_mut(), expected).await;

        match end {
            BroadcastEnd::Exited(exit_code) => {
                let elapsed = started.elapsed();
                tracing::warn!(
                    id = %id,
                    exit_code = ?exit_code,
                    elapsed = %format_hm(elapsed),
                    "Stream process ended unexpectedly"
                );
                self.emit(RotationEvent::BroadcastEndedEarly {
                    id: id.clone(),
                    exit_code,
                    elapsed,
                });
            }
            BroadcastEnd::Deadline => {
                tracing::info!(id = %id, "Stream reached its expected end");
            }
            BroadcastEnd::Shutdown => {
                tracing::info!(id = %id, "Shutdown requested during stream");
            }
        }

        self.set_phase(Phase::Rotating);
        let outcome = process.stop(self.timing.stop_grace).await;
        self.state.go_off_air();
        self.emit(RotationEvent::BroadcastCompleted {
            id: id.clone(),
            outcome,
        });

        if matches!(end, BroadcastEnd::Shutdown) || self.is_shutdown() {
            self.abort_prefetch();
            return Ok(CycleEnd::Shutdown);
        }

        self.collect_prefetch().await?;
        if self.state.next().is_some() {
            let promoted = self.state.promote_next()?;
            tracing::info!(id = %promoted.candidate.id, "Switching to next video");
            self.emit(RotationEvent::Promoted {
                id: promoted.candidate.id.clone(),
            });
            return Ok(CycleEnd::Rotated(Some(promoted)));
        }

        if self.prefetch.is_some() {
            tracing::info!("Next video still being prepared, continuing in background");
        } else {
            tracing::info!("No next video prepared");
        }
        if self.backoff(String::from("no next video prepared")).await {
            Ok(CycleEnd::Rotated(None))
        } else {
            Ok(CycleEnd::Shutdown)
        }
    }

    /// Wait for the earliest of process exit, expected end, or shutdown
    async fn supervise(
        &mut self,
        process: &mut dyn BroadcastProcess,
        expected: Duration,
    ) -> BroadcastEnd {
        let deadline = tokio::time::sleep(expected);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        enum Wake {
            Exited(Option<i32>),
            Deadline,
            Tick,
            Shutdown,
        }

        loop {
            let wake = tokio::select! {
                _ = &mut deadline => Wake::Deadline,
                code = process.wait_exit() => Wake::Exited(code),
                _ = ticker.tick() => Wake::Tick,
                _ = wait_for_shutdown(&mut self.shutdown) => Wake::Shutdown,
            };

            match wake {
                Wake::Exited(code) => return BroadcastEnd::Exited(code),
                Wake::Deadline => return BroadcastEnd::Deadline,
                Wake::Shutdown => return BroadcastEnd::Shutdown,
                Wake::Tick => {
                    if !process.is_alive() {
                        return BroadcastEnd::Exited(None);
                    }
                    tracing::debug!(pid = ?process.id(), "Stream still running");
                }
            }
        }
    }

    /// Ensure one prefetch task covers the broadcast that just started
    ///
    /// No task is spawned while an earlier one is still running or its item
    /// is already waiting in `next`.
    async fn start_prefetch(&mut self) {
        if let Err(e) = self.collect_prefetch().await {
            tracing::error!(error = %e, "Previous preparation failed");
        }

        if self.prefetch.is_some() {
            tracing::debug!("Earlier preparation still running");
            return;
        }
        if let Some(next) = self.state.next() {
            tracing::debug!(id = %next.candidate.id, "Next video already prepared");
            return;
        }

        self.prefetch = Some(spawn_prefetch(
            Arc::clone(&self.pipeline),
            self.timing.prefetch_delay,
            self.shutdown.clone(),
            self.events.clone(),
        ));
    }

    /// Move a finished prefetch result into `next`; a running task is left alone
    async fn collect_prefetch(&mut self) -> SchedulerResult<()> {
        if !self.prefetch.as_ref().is_some_and(JoinHandle::is_finished) {
            return Ok(());
        }
        let Some(handle) = self.prefetch.take() else {
            return Ok(());
        };

        let prepared = handle.await.map_err(|e| SchedulerError::PrefetchFailed {
            reason: e.to_string(),
        })?;
        if let Some(item) = prepared {
            self.state.store_next(item);
        }
        Ok(())
    }

    fn abort_prefetch(&mut self) {
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
    }

    /// Wait the cycle backoff; returns false when shutdown cut it short
    async fn backoff(&mut self, reason: String) -> bool {
        let delay = self.timing.cycle_backoff;
        tracing::info!(reason = %reason, delay_secs = delay.as_secs(), "Backing off");
        self.emit(RotationEvent::BackingOff { reason, delay });

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = wait_for_shutdown(&mut self.shutdown) => false,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        let from = self.state.set_phase(phase);
        if from != phase {
            tracing::debug!(from = %from, to = %phase, "Phase changed");
            self.emit(RotationEvent::PhaseChanged { from, to: phase });
        }
    }

    fn emit(&self, event: RotationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}
