//! Allocator configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `max_free` value meaning "keep every freed node".
pub const MAX_FREE_UNLIMITED: usize = 0;

/// Configuration for an [`Allocator`](super::Allocator)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AllocatorConfig {
    /// Upper bound on bytes cached in the free lists; `None` keeps everything
    pub max_free: Option<usize>,

    /// Serialize free-list mutations behind a dedicated mutex
    pub locked: bool,
}

impl AllocatorConfig {
    /// Cache every freed node; no serialization mutex
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Cache at most `max_free` bytes of freed nodes
    #[must_use]
    pub fn bounded(max_free: usize) -> Self {
        Self {
            max_free: normalize_max_free(max_free),
            locked: false,
        }
    }

    /// Shared between pools living on different threads
    #[must_use]
    pub fn locked() -> Self {
        Self {
            max_free: None,
            locked: true,
        }
    }

    /// Builder-style setter for the free-byte threshold
    #[must_use]
    pub fn with_max_free(mut self, max_free: usize) -> Self {
        self.max_free = normalize_max_free(max_free);
        self
    }
}

/// Maps the [`MAX_FREE_UNLIMITED`] sentinel to `None`.
pub(crate) fn normalize_max_free(max_free: usize) -> Option<usize> {
    (max_free != MAX_FREE_UNLIMITED).then_some(max_free)
}
