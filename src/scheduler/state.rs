//! Rotation state owned by the scheduler

use serde::Serialize;
use std::fmt;

use super::error::{SchedulerError, SchedulerResult};
use crate::models::PreparedItem;

/// Scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Selecting,
    Fetching,
    Broadcasting,
    Rotating,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Fetching => "fetching",
            Self::Broadcasting => "broadcasting",
            Self::Rotating => "rotating",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Current and next items plus the phase
///
/// `current` is reassigned only through [`RotationState::promote_next`] or
/// [`RotationState::go_on_air`], and never while `on_air` is set.
#[derive(Debug, Clone)]
pub struct RotationState {
    phase: Phase,
    current: Option<PreparedItem>,
    next: Option<PreparedItem>,
    on_air: bool,
}

impl Default for RotationState {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            current: None,
            next: None,
            on_air: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `phase`, returning the previous one
    pub fn set_phase(&mut self, phase: Phase) -> Phase {
        std::mem::replace(&mut self.phase, phase)
    }

    pub fn current(&self) -> Option<&PreparedItem> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&PreparedItem> {
        self.next.as_ref()
    }

    pub fn is_on_air(&self) -> bool {
        self.on_air
    }

    /// Record that `item` is now being broadcast
    pub fn go_on_air(&mut self, item: PreparedItem) -> SchedulerResult<()> {
        if self.on_air {
            return Err(SchedulerError::PromotionWhileOnAir {
                current: self.current_id(),
                next: item.candidate.id,
            });
        }
        self.current = Some(item);
        self.on_air = true;
        Ok(())
    }

    /// Record that the broadcast process has been confirmed stopped
    pub fn go_off_air(&mut self) {
        self.on_air = false;
    }

    /// Store the item handed back by the prefetch task
    pub fn store_next(&mut self, item: PreparedItem) {
        self.next = Some(item);
    }

    /// Make the prepared item current and clear `next`
    pub fn promote_next(&mut self) -> SchedulerResult<PreparedItem> {
        if self.on_air {
            return Err(SchedulerError::PromotionWhileOnAir {
                current: self.current_id(),
                next: self
                    .next
                    .as_ref()
                    .map(|item| item.candidate.id.clone())
                    .unwrap_or_default(),
            });
        }

        let next = self.next.take().ok_or(SchedulerError::NothingToPromote)?;
        self.current = Some(next.clone());
        Ok(next)
    }

    /// Drop any prepared item without promoting it
    pub fn discard_next(&mut self) -> Option<PreparedItem> {
        self.next.take()
    }

    fn current_id(&self) -> String {
        self.current
            .as_ref()
            .map(|item| item.candidate.id.clone())
            .unwrap_or_default()
    }
}
