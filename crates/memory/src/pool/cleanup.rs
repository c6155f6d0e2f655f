//! Cleanup registrations attached to a pool.
//!
//! Three hook lists are kept apart: pre-cleanups (run before the pool's
//! children are torn down), plain cleanups (run after them, newest first) and
//! child hooks (run only when a forked child asks for them). A registration may
//! own one entry in the plain or pre list plus one entry in the child list;
//! both share its [`CleanupId`].

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::BoxError;

/// Result returned by cleanup callbacks
pub type CleanupResult = Result<(), BoxError>;

pub(crate) type CleanupFn = Box<dyn FnOnce() -> CleanupResult + Send + 'static>;

/// Handle identifying one cleanup registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(NonZeroU64);

impl CleanupId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw id value
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for CleanupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanup#{}", self.0)
    }
}

/// Cleanup that does nothing, for registrations that only need a child hook.
pub fn null_cleanup() -> CleanupResult {
    Ok(())
}

/// When a registration runs relative to the pool's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// Before children are destroyed
    Pre,
    /// After children are destroyed
    Plain,
}

struct Entry {
    id: CleanupId,
    run: CleanupFn,
}

#[derive(Default)]
pub(crate) struct CleanupList {
    pre: Vec<Entry>,
    plain: Vec<Entry>,
    child: Vec<Entry>,
}

impl CleanupList {
    pub(crate) fn register(
        &mut self,
        stage: Stage,
        run: CleanupFn,
        child: Option<CleanupFn>,
    ) -> CleanupId {
        let id = CleanupId::next();
        let list = match stage {
            Stage::Pre => &mut self.pre,
            Stage::Plain => &mut self.plain,
        };
        list.push(Entry { id, run });
        if let Some(child) = child {
            self.child.push(Entry { id, run: child });
        }
        id
    }

    /// Replaces the child hook of an existing registration.
    pub(crate) fn set_child(&mut self, id: CleanupId, child: CleanupFn) -> bool {
        if !self.contains(id) {
            return false;
        }
        remove(&mut self.child, id);
        self.child.push(Entry { id, run: child });
        true
    }

    /// Unregisters `id`, returning its plain (or pre) callback.
    pub(crate) fn remove(&mut self, id: CleanupId) -> Option<CleanupFn> {
        let run = remove(&mut self.plain, id).or_else(|| remove(&mut self.pre, id))?;
        remove(&mut self.child, id);
        Some(run)
    }

    /// Pops the newest registration of `stage`, dropping its child hook.
    pub(crate) fn pop(&mut self, stage: Stage) -> Option<(CleanupId, CleanupFn)> {
        let list = match stage {
            Stage::Pre => &mut self.pre,
            Stage::Plain => &mut self.plain,
        };
        let entry = list.pop()?;
        remove(&mut self.child, entry.id);
        Some((entry.id, entry.run))
    }

    /// Pops the newest child hook, leaving the plain callback registered.
    pub(crate) fn pop_child(&mut self) -> Option<(CleanupId, CleanupFn)> {
        self.child.pop().map(|entry| (entry.id, entry.run))
    }

    pub(crate) fn contains(&self, id: CleanupId) -> bool {
        [&self.pre, &self.plain, &self.child]
            .iter()
            .any(|list| list.iter().any(|entry| entry.id == id))
    }

    pub(crate) fn len(&self) -> usize {
        self.pre.len() + self.plain.len()
    }
}

fn remove(list: &mut Vec<Entry>, id: CleanupId) -> Option<CleanupFn> {
    let pos = list.iter().rposition(|entry| entry.id == id)?;
    Some(list.remove(pos).run)
}

impl fmt::Debug for CleanupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupList")
            .field("pre", &self.pre.len())
            .field("plain", &self.plain.len())
            .field("child", &self.child.len())
            .finish()
    }
}
