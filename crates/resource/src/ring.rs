//! Slab-backed ring of idle resources.
//!
//! Entries live in a `Vec` of slots linked by index. Vacated slots form the
//! free chain and are reused before the slab grows, so steady-state
//! release/acquire cycles do not allocate. A slot is either linked into the
//! ring or on the free chain, never both.

use std::fmt;

struct Slot<T> {
    value: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

pub(crate) struct Ring<T> {
    slots: Vec<Slot<T>>,
    /// Newest entry
    head: Option<usize>,
    /// Oldest entry
    tail: Option<usize>,
    /// First vacant slot, chained through `next`
    free: Option<usize>,
    len: usize,
}

impl<T> Ring<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Vacant slots waiting for reuse
    pub(crate) fn spare(&self) -> usize {
        self.slots.len() - self.len
    }

    pub(crate) fn push_front(&mut self, value: T) {
        let slot = Slot {
            value: Some(value),
            prev: None,
            next: self.head,
        };
        let index = match self.free {
            Some(index) => {
                self.free = self.slots[index].next;
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        match self.head {
            Some(old) => self.slots[old].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        self.head.and_then(|index| self.unlink(index))
    }

    pub(crate) fn pop_back(&mut self) -> Option<T> {
        self.tail.and_then(|index| self.unlink(index))
    }

    /// Oldest entry
    pub(crate) fn back(&self) -> Option<&T> {
        self.tail.and_then(|index| self.slots[index].value.as_ref())
    }

    /// Entries from newest to oldest.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = &self.slots[cursor?];
            cursor = slot.next;
            slot.value.as_ref()
        })
    }

    fn unlink(&mut self, index: usize) -> Option<T> {
        let slot = &mut self.slots[index];
        let value = slot.value.take()?;
        let (prev, next) = (slot.prev.take(), slot.next.take());
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
        self.slots[index].next = self.free;
        self.free = Some(index);
        self.len -= 1;
        Some(value)
    }
}

impl<T> fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("len", &self.len)
            .field("spare", &self.spare())
            .finish()
    }
}
