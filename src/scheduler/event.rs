//! Rotation events broadcast to observers

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use super::state::Phase;
use crate::broadcast::StopOutcome;
use crate::storage::SweepReport;

/// Events emitted by the rotation scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationEvent {
    /// The scheduler moved between phases
    PhaseChanged { from: Phase, to: Phase },

    /// A candidate was chosen for the current cycle
    CandidateSelected { id: String, title: String },

    /// The artifact for the current cycle is on disk
    ArtifactReady { id: String, path: PathBuf, size: u64 },

    /// The broadcast process was launched
    BroadcastStarted { id: String, expected: Duration },

    /// The broadcast process exited before its expected end
    BroadcastEndedEarly {
        id: String,
        exit_code: Option<i32>,
        elapsed: Duration,
    },

    /// The broadcast process was stopped and the slot is free
    BroadcastCompleted { id: String, outcome: StopOutcome },

    /// The prefetch task produced the next item
    NextPrepared { id: String },

    /// The prefetch task finished its retention sweep
    RetentionSwept { report: SweepReport },

    /// The prepared item became current
    Promoted { id: String },

    /// A step failed or nothing was prepared; waiting before the next cycle
    BackingOff { reason: String, delay: Duration },

    /// The scheduler loop has exited
    Stopped,
}
