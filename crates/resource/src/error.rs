//! Error types for resource list operations
use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by user constructors and destructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for resource list operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a [`ResList`](crate::ResList)
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Bounds or flags are inconsistent
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: String,
    },

    /// `acquire` waited for its whole timeout without a slot freeing up
    #[error("Acquire timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The configured acquire timeout
        timeout: Duration,
    },

    /// `acquire` would have to block but blocking is unavailable
    #[error("Acquire would block: hard maximum reached and blocking is disabled")]
    WouldBlock,

    /// The user constructor failed
    #[error("Resource constructor failed: {source}")]
    Constructor {
        /// The constructor's error, untouched
        #[source]
        source: BoxError,
    },

    /// The user destructor failed
    #[error("Resource destructor failed: {source}")]
    Destructor {
        /// The destructor's error, untouched
        #[source]
        source: BoxError,
    },

    /// The list has been destroyed (explicitly or by its pool)
    #[error("Resource list has been destroyed")]
    Destroyed,

    /// `destroy` found resources still checked out
    #[error("Resource list destroyed with {count} resource(s) still checked out")]
    Outstanding {
        /// Resources not yet returned
        count: usize,
    },

    /// Registering with or unregistering from the owning pool failed
    #[error("Pool error: {0}")]
    Pool(#[from] regio_memory::MemoryError),

    /// A bookkeeping invariant did not hold
    #[error("Internal error: {reason}")]
    Internal {
        /// Which invariant broke
        reason: String,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(reason: S) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an internal error and log it
    pub fn internal<S: Into<String>>(reason: S) -> Self {
        let reason = reason.into();
        tracing::error!(%reason, "resource list invariant violated");
        Self::Internal { reason }
    }

    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::WouldBlock | Self::Constructor { .. }
        )
    }
}
