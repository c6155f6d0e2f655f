//! Common types and constants for memory management

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

/// Memory alignment requirements
pub mod alignment {
    /// Alignment of every pool allocation and of memnode storage
    pub const MIN_ALIGN: usize = 8;

    /// Rounds `size` up to the next multiple of `align`.
    ///
    /// `align` must be a power of two. Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn align_up(size: usize, align: usize) -> Option<usize> {
        debug_assert!(align.is_power_of_two());
        match size.checked_add(align - 1) {
            Some(padded) => Some(padded & !(align - 1)),
            None => None,
        }
    }

    /// Rounds `size` up to [`MIN_ALIGN`].
    #[inline]
    #[must_use]
    pub const fn align_default(size: usize) -> Option<usize> {
        align_up(size, MIN_ALIGN)
    }
}

/// Memnode size classes.
///
/// Nodes are carved in multiples of [`BOUNDARY_SIZE`](class::BOUNDARY_SIZE) and
/// never smaller than [`MIN_ALLOC`](class::MIN_ALLOC). A node of `n` boundary
/// pages has index `n - 1`; indices at or above [`MAX_INDEX`](class::MAX_INDEX)
/// share the "sink" bucket.
pub mod class {
    use super::alignment::align_up;

    /// log2 of the boundary size
    pub const BOUNDARY_INDEX: u32 = 12;

    /// Granularity of memnode sizes (one page)
    pub const BOUNDARY_SIZE: usize = 1 << BOUNDARY_INDEX;

    /// Smallest memnode ever carved
    pub const MIN_ALLOC: usize = 2 * BOUNDARY_SIZE;

    /// Number of free-list buckets; bucket 0 is the sink
    pub const MAX_INDEX: usize = 20;

    /// Node size needed to serve a request of `size` bytes.
    #[inline]
    #[must_use]
    pub const fn node_size(size: usize) -> Option<usize> {
        match align_up(size, BOUNDARY_SIZE) {
            Some(rounded) if rounded < MIN_ALLOC => Some(MIN_ALLOC),
            other => other,
        }
    }

    /// Size-class index of a node of `node_size` bytes.
    #[inline]
    #[must_use]
    pub const fn index_of(node_size: usize) -> usize {
        (node_size >> BOUNDARY_INDEX) - 1
    }

    /// Free-list bucket a node of class `index` is filed under.
    #[inline]
    #[must_use]
    pub const fn bucket_of(index: usize) -> usize {
        if index < MAX_INDEX { index } else { 0 }
    }
}

/// Unique identifier of a pool.
///
/// Uses `NonZeroU64` so `Option<PoolId>` stays the size of a `u64`. Ids are
/// never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(NonZeroU64);

impl PoolId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and a u64 does not wrap in practice.
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw id value
    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}
