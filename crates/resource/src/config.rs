//! Resource list configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bounds and timing of a [`ResList`](crate::ResList).
///
/// Invariant checked by [`validate`](Self::validate):
/// `min <= smax <= hmax` and `hmax > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResListConfig {
    /// Idle resources kept constructed ahead of demand
    pub min: usize,
    /// Idle count above which expired resources are destroyed
    pub smax: usize,
    /// Hard cap on resources in existence
    pub hmax: usize,
    /// Idle age after which a surplus resource may be destroyed
    pub ttl: Option<Duration>,
    /// How long `acquire` may block; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for ResListConfig {
    fn default() -> Self {
        Self {
            min: 0,
            smax: 1,
            hmax: 1,
            ttl: None,
            timeout: None,
        }
    }
}

impl ResListConfig {
    /// Config with the given bounds and no ttl or timeout
    #[must_use]
    pub fn new(min: usize, smax: usize, hmax: usize) -> Self {
        Self {
            min,
            smax,
            hmax,
            ttl: None,
            timeout: None,
        }
    }

    /// Sets the idle time-to-live; zero disables expiry
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Sets the acquire timeout; zero waits indefinitely
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Checks the bounds.
    pub fn validate(&self) -> Result<()> {
        if self.hmax == 0 {
            return Err(Error::invalid_argument("hmax must be greater than zero"));
        }
        if self.min > self.smax {
            return Err(Error::invalid_argument(format!(
                "min ({}) exceeds smax ({})",
                self.min, self.smax
            )));
        }
        if self.smax > self.hmax {
            return Err(Error::invalid_argument(format!(
                "smax ({}) exceeds hmax ({})",
                self.smax, self.hmax
            )));
        }
        Ok(())
    }

    /// Bounds as enforced by this build.
    ///
    /// Without the `threads` feature nothing can wait for a release, so at
    /// most one resource ever exists.
    #[must_use]
    pub(crate) fn effective(mut self) -> Self {
        if !cfg!(feature = "threads") {
            self.min = self.min.min(1);
            self.smax = self.smax.min(1);
            self.hmax = 1;
        }
        self
    }
}
