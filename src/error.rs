//! Error classification for the rebroadcast crate
//!
//! Each domain keeps its own error type. This module gives them a shared
//! classification so log sites and the binary can tell a failed step the
//! rotation will retry from one that needs an operator.
//!
//! # Architecture
//!
//! - [`RebroadcastErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Startup errors surfaced by the binary before the rotation runs
//!
//! # Usage
//!
//! ```rust,ignore
//! use rebroadcast::error::RebroadcastErrorTrait;
//!
//! fn report(err: &impl RebroadcastErrorTrait) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = %err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!(category = %err.category(), "Fatal error: {err}");
//!     }
//! }
//! ```

use std::fmt;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::broadcast::LaunchError;
pub use crate::fetcher::FetchError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::source::{AuthError, SourceError};

/// Common trait for all rebroadcast error types
///
/// This trait provides a unified interface for error handling across
/// all modules, enabling consistent error processing strategies.
pub trait RebroadcastErrorTrait: std::error::Error {
    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// Check if this error is recoverable (the rotation can back off and retry)
    fn is_recoverable(&self) -> bool {
        self.category() != ErrorCategory::Auth
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, API status, retrieval)
    Network,
    /// Credentials unobtainable or rejected
    Auth,
    /// Storage and I/O errors
    Storage,
    /// External process launch and supervision errors
    Process,
    /// Rotation sequencing errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Storage => "storage",
            Self::Process => "process",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

impl RebroadcastErrorTrait for AuthError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) => ErrorCategory::Network,
            _ => ErrorCategory::Auth,
        }
    }
}

impl RebroadcastErrorTrait for SourceError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(e) => e.category(),
            _ => ErrorCategory::Network,
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Decode(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(e) => e.is_recoverable(),
        }
    }
}

impl RebroadcastErrorTrait for FetchError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Storage,
            Self::Spawn(_) => ErrorCategory::Process,
            _ => ErrorCategory::Network,
        }
    }
}

impl RebroadcastErrorTrait for LaunchError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Spawn(_) => ErrorCategory::Process,
            Self::MissingArtifact(_) | Self::EmptyArtifact(_) => ErrorCategory::Storage,
        }
    }
}

impl RebroadcastErrorTrait for SchedulerError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::NoCandidate | Self::FetchFailed { .. } => ErrorCategory::Network,
            Self::LaunchFailed { .. } => ErrorCategory::Process,
            Self::PrefetchFailed { .. }
            | Self::PromotionWhileOnAir { .. }
            | Self::NothingToPromote => ErrorCategory::Scheduler,
        }
    }
}

/// Errors raised while assembling the rotation at startup
#[derive(Error, Debug)]
pub enum Error {
    /// Credential errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RebroadcastErrorTrait for Error {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(e) => e.category(),
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the startup Error type
pub type Result<T> = std::result::Result<T, Error>;
