//! Error types for regio-memory
//!
//! Allocation failures carry the requested size; pool errors carry the
//! [`PoolId`] they concern so log lines can be correlated.

use core::alloc::Layout;
use thiserror::Error;

use crate::core::PoolId;

/// Boxed error returned by user-supplied cleanup callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by allocators and pools
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation ---
    #[error("Out of memory: the memory source could not provide {size} bytes")]
    OutOfMemory { size: usize },

    #[error("Memnode layout rejected: {reason}")]
    InvalidLayout { reason: String },

    #[error("Requested size overflows in {operation}")]
    SizeOverflow { operation: String },

    // --- Configuration ---
    #[error("Invalid allocator configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Pool tree ---
    #[error("{pool} has been destroyed")]
    PoolDestroyed { pool: PoolId },

    #[error("Cleanup #{id} is not registered on {pool}")]
    CleanupNotFound { pool: PoolId, id: u64 },
}

impl MemoryError {
    /// Only exhaustion may clear up once other pools give memory back
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Stable code for logs and metrics
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "MEM:ALLOC:OOM",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::PoolDestroyed { .. } => "MEM:POOL:DESTROYED",
            Self::CleanupNotFound { .. } => "MEM:POOL:CLEANUP",
        }
    }

    /// Logs at `error` level when `logging` is enabled.
    pub fn out_of_memory(size: usize) -> Self {
        #[cfg(feature = "logging")]
        tracing::error!(size, "memory source exhausted");

        Self::OutOfMemory { size }
    }

    /// Out-of-memory for the size of `layout`
    pub fn out_of_memory_with_layout(layout: Layout) -> Self {
        Self::out_of_memory(layout.size())
    }

    pub fn invalid_layout(reason: impl Into<String>) -> Self {
        Self::InvalidLayout {
            reason: reason.into(),
        }
    }

    pub fn size_overflow(operation: impl Into<String>) -> Self {
        Self::SizeOverflow {
            operation: operation.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn pool_destroyed(pool: PoolId) -> Self {
        Self::PoolDestroyed { pool }
    }
}

/// Result of allocator and pool operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Shorthand used across the crate
pub type Result<T> = MemoryResult<T>;
