//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
///
/// Every variant except the promotion guards is a failed cycle step: the
/// scheduler logs it and backs off before the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Selection produced no eligible candidate
    NoCandidate,

    /// Artifact could not be acquired
    FetchFailed { id: String },

    /// Broadcast process could not be launched
    LaunchFailed { id: String, reason: String },

    /// Background preparation task failed
    PrefetchFailed { reason: String },

    /// Promotion attempted while the current item is still on air
    PromotionWhileOnAir { current: String, next: String },

    /// Promotion attempted with no prepared item
    NothingToPromote,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidate => {
                write!(f, "No suitable live stream found")
            }
            Self::FetchFailed { id } => {
                write!(f, "Failed to download video '{}'", id)
            }
            Self::LaunchFailed { id, reason } => {
                write!(f, "Failed to start stream for '{}': {}", id, reason)
            }
            Self::PrefetchFailed { reason } => {
                write!(f, "Preparation of next video failed: {}", reason)
            }
            Self::PromotionWhileOnAir { current, next } => {
                write!(
                    f,
                    "Cannot promote '{}' while '{}' is still on air",
                    next, current
                )
            }
            Self::NothingToPromote => {
                write!(f, "No prepared video to promote")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create a fetch failure error
    pub fn fetch_failed(id: impl Into<String>) -> Self {
        Self::FetchFailed { id: id.into() }
    }

    /// Create a launch failure error
    pub fn launch_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Short step name used in logs and backoff events
    pub fn step(&self) -> &'static str {
        match self {
            Self::NoCandidate => "select",
            Self::FetchFailed { .. } => "fetch",
            Self::LaunchFailed { .. } => "launch",
            Self::PrefetchFailed { .. } => "prefetch",
            Self::PromotionWhileOnAir { .. } | Self::NothingToPromote => "promote",
        }
    }
}
