//! Memnodes: raw chunks of memory handed out by the [`Allocator`](super::Allocator).
//!
//! A node owns one allocation obtained from a [`MemorySource`](super::MemorySource)
//! and carries a bump cursor (`first_avail`) into it. Nodes never release their
//! storage on drop; they must travel back to the allocator that carved them.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use crate::core::class::BOUNDARY_INDEX;

/// A chunk of raw memory with a bump cursor.
pub struct MemNode {
    base: NonNull<u8>,
    layout: Layout,
    index: usize,
    free_index: usize,
    first_avail: usize,
}

// SAFETY: MemNode is the unique owner of its allocation.
// - `base` is never shared by two nodes
// - the node carries no thread-local state
unsafe impl Send for MemNode {}

impl MemNode {
    pub(crate) fn new(base: NonNull<u8>, layout: Layout, index: usize) -> Self {
        let mut node = Self {
            base,
            layout,
            index,
            free_index: 0,
            first_avail: 0,
        };
        node.update_free_index();
        node
    }

    /// Size class of the node
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Size class of the space still available behind the cursor
    #[inline]
    pub fn free_index(&self) -> usize {
        self.free_index
    }

    /// Usable bytes in the node (`endp`)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Bytes already handed out (`first_avail`)
    #[inline]
    pub fn used(&self) -> usize {
        self.first_avail
    }

    /// Bytes left behind the cursor
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.first_avail
    }

    /// Start of the node's storage
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.base
    }

    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns `true` if `ptr` points into this node's storage.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.capacity()
    }

    /// Advances the cursor by `size` bytes and returns the old position.
    ///
    /// `size` is expected to be already rounded to the pool alignment.
    pub(crate) fn bump(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.remaining() {
            return None;
        }
        // SAFETY: first_avail + size <= capacity, so the offset stays inside
        // (or one past the end of) the allocation owned by this node.
        let ptr = unsafe { self.base.add(self.first_avail) };
        self.first_avail += size;
        self.update_free_index();
        Some(ptr)
    }

    /// Rewinds the cursor to the start of the node.
    pub(crate) fn reset(&mut self) {
        self.first_avail = 0;
        self.update_free_index();
    }

    fn update_free_index(&mut self) {
        // Same encoding as `index`: whole boundary pages left, minus one.
        self.free_index = (self.remaining() >> BOUNDARY_INDEX).saturating_sub(1);
        debug_assert!(self.free_index <= self.index);
    }
}

impl fmt::Debug for MemNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemNode")
            .field("base", &self.base)
            .field("index", &self.index)
            .field("free_index", &self.free_index)
            .field("first_avail", &self.first_avail)
            .field("endp", &self.capacity())
            .finish()
    }
}
