//! The raw memory primitive memnodes are carved from.

use core::alloc::Layout;
use core::ptr::NonNull;

/// Source of raw memory for memnodes.
///
/// Failure is reported as `None`, never by panicking.
pub trait MemorySource: Send + Sync {
    /// Obtain a block described by `layout` (non-zero size).
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a block to the source.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](Self::allocate) on this source with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// [`MemorySource`] backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSource;

impl MemorySource for SystemSource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        // SAFETY: memnode layouts are never zero-sized (at least MIN_ALLOC).
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded contract, ptr was produced by `alloc` with `layout`.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
