//! Hierarchical memory pools.
//!
//! A [`Pool`] bump-allocates from a chain of memnodes obtained from its
//! [`Allocator`], owns a list of cleanup callbacks and a set of child pools.
//! Everything allocated from a pool becomes invalid together when the pool is
//! cleared or destroyed.
//!
//! ## Teardown order
//!
//! Clearing or destroying a pool runs, for the pool and then recursively for
//! every descendant (deepest first, one child fully before its next sibling):
//!
//! 1. pre-cleanups, newest first
//! 2. destruction of every child pool
//! 3. plain cleanups, newest first
//! 4. return of the memnode chain to the allocator
//!
//! The walk uses an explicit worklist, so deep trees do not grow the stack.
//!
//! ## Handles
//!
//! [`Pool`] is the owning handle: dropping it destroys the pool and its
//! subtree. [`PoolRef`] is a cheap non-owning handle (what `Pool` derefs to);
//! once the pool is destroyed every operation through it returns
//! [`MemoryError::PoolDestroyed`].
//!
//! ## Safety
//!
//! Allocation functions return raw [`NonNull`] pointers. They stay valid until
//! the pool (or an ancestor) is cleared or destroyed; dereferencing them after
//! that point is undefined behaviour, exactly like a dangling reference.
//!
//! # Examples
//!
//! ```
//! use regio_memory::pool::Pool;
//!
//! let root = Pool::new()?;
//! let request = root.create_child()?;
//!
//! let buf = request.pcalloc(256)?;
//! // SAFETY: `buf` holds 256 zeroed bytes owned by `request`.
//! assert!(unsafe { core::slice::from_raw_parts(buf.as_ptr(), 256) }.iter().all(|&b| b == 0));
//!
//! request.cleanup_register(|| {
//!     println!("request finished");
//!     Ok(())
//! })?;
//! drop(request);
//! # Ok::<(), regio_memory::MemoryError>(())
//! ```

mod cleanup;
mod strings;

use core::any::Any;
use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub use cleanup::{CleanupId, CleanupResult, null_cleanup};

use crate::allocator::{Allocator, AllocatorConfig, MemNode};
use crate::core::{PoolId, alignment};
use crate::error::{MemoryError, MemoryResult};
use cleanup::{CleanupFn, CleanupList, Stage};

/// Callback invoked when a pool allocation fails.
///
/// If the handler returns, the failing call reports the error to its caller.
pub type AbortHandler = Arc<dyn Fn(&MemoryError) + Send + Sync>;

type UserData = Arc<dyn Any + Send + Sync>;

/// Creation options for a pool
#[derive(Clone, Default)]
pub struct PoolOptions {
    /// Give the pool a private allocator instead of sharing the parent's
    pub new_allocator: bool,
    /// Attach a serialization mutex to the private allocator
    pub locked: bool,
    /// Free-byte threshold of the private allocator
    pub max_free: Option<usize>,
    /// Abort handler; inherited from the parent when `None`
    pub abort: Option<AbortHandler>,
    /// Debugging tag
    pub tag: Option<String>,
}

impl PoolOptions {
    /// Default options: share the parent's allocator, inherit its abort handler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a private allocator
    #[must_use]
    pub fn with_new_allocator(mut self) -> Self {
        self.new_allocator = true;
        self
    }

    /// Use a private allocator guarded by a serialization mutex
    #[must_use]
    pub fn with_locked_allocator(mut self) -> Self {
        self.new_allocator = true;
        self.locked = true;
        self
    }

    /// Free-byte threshold for a private allocator
    ///
    /// Pool creation fails with [`MemoryError::InvalidConfig`] when the pool
    /// would share an allocator instead of building one: a child pool without
    /// [`with_new_allocator`](Self::with_new_allocator), or any pool made by
    /// [`Pool::with_allocator`]. The same holds for the locked flag.
    #[must_use]
    pub fn with_max_free(mut self, max_free: usize) -> Self {
        self.max_free = Some(max_free);
        self
    }

    /// Abort handler for allocation failures
    #[must_use]
    pub fn with_abort(mut self, abort: impl Fn(&MemoryError) + Send + Sync + 'static) -> Self {
        self.abort = Some(Arc::new(abort));
        self
    }

    /// Debugging tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            max_free: self.max_free,
            locked: self.locked,
        }
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("new_allocator", &self.new_allocator)
            .field("locked", &self.locked)
            .field("max_free", &self.max_free)
            .field("abort", &self.abort.is_some())
            .field("tag", &self.tag)
            .finish()
    }
}

/// Lifecycle of a pool.
///
/// A cleared pool is `Active` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Usable
    Active,
    /// Running its teardown; allocation and cleanup registration still work
    Destroying,
    /// Terminal
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Clear,
    Destroy,
}

struct PoolInner {
    lifecycle: Lifecycle,
    /// `nodes[0]` is the self-node; the last node is the bump target
    nodes: Vec<MemNode>,
    allocated: usize,
    children: Vec<Arc<PoolShared>>,
    cleanups: CleanupList,
    userdata: HashMap<String, UserData>,
}

struct PoolShared {
    id: PoolId,
    parent: Option<Weak<PoolShared>>,
    allocator: Arc<Allocator>,
    owns_allocator: bool,
    abort: Mutex<Option<AbortHandler>>,
    tag: Mutex<Option<Arc<str>>>,
    inner: Mutex<PoolInner>,
}

impl PoolShared {
    fn create(
        parent: Option<&Arc<PoolShared>>,
        allocator: Option<Arc<Allocator>>,
        options: PoolOptions,
    ) -> MemoryResult<Arc<Self>> {
        let configures_allocator =
            options.new_allocator || options.locked || options.max_free.is_some();
        let shares_allocator = allocator.is_some() || (parent.is_some() && !options.new_allocator);
        if configures_allocator && shares_allocator {
            return Err(MemoryError::invalid_config(
                "allocator settings need a private allocator; the pool would share one",
            ));
        }
        if let Some(parent) = parent {
            parent.ensure_alive()?;
        }

        let abort = options
            .abort
            .clone()
            .or_else(|| parent.and_then(|p| p.abort.lock().clone()));
        let (allocator, owns_allocator) = match (allocator, parent) {
            (Some(allocator), _) => (allocator, false),
            (None, Some(parent)) if !options.new_allocator => {
                (Arc::clone(&parent.allocator), false)
            }
            _ => (
                Arc::new(Allocator::with_config(&options.allocator_config())),
                true,
            ),
        };

        let id = PoolId::next();
        let self_node = match allocator.alloc(0) {
            Ok(node) => node,
            Err(err) => {
                invoke_abort(abort.as_ref(), id, &err);
                return Err(err);
            }
        };
        if owns_allocator {
            allocator.owner_set(Some(id));
        }

        let shared = Arc::new(Self {
            id,
            parent: parent.map(Arc::downgrade),
            allocator,
            owns_allocator,
            abort: Mutex::new(abort),
            tag: Mutex::new(options.tag.map(Arc::from)),
            inner: Mutex::new(PoolInner {
                lifecycle: Lifecycle::Active,
                nodes: vec![self_node],
                allocated: 0,
                children: Vec::new(),
                cleanups: CleanupList::default(),
                userdata: HashMap::new(),
            }),
        });

        if let Some(parent) = parent {
            let mut inner = parent.inner.lock();
            if inner.lifecycle == Lifecycle::Destroyed {
                drop(inner);
                shared.release_memory(true);
                return Err(MemoryError::pool_destroyed(parent.id));
            }
            inner.children.push(Arc::clone(&shared));
        }

        #[cfg(feature = "logging")]
        tracing::debug!(
            pool = %id,
            parent = ?parent.map(|p| p.id),
            private_allocator = owns_allocator,
            "pool created"
        );

        Ok(shared)
    }

    fn ensure_alive(&self) -> MemoryResult<()> {
        if self.inner.lock().lifecycle == Lifecycle::Destroyed {
            return Err(MemoryError::pool_destroyed(self.id));
        }
        Ok(())
    }

    fn palloc(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let size =
            alignment::align_default(size).ok_or_else(|| MemoryError::size_overflow("palloc"))?;
        self.bump(size).inspect_err(|err| {
            if !matches!(err, MemoryError::PoolDestroyed { .. }) {
                let handler = self.abort.lock().clone();
                invoke_abort(handler.as_ref(), self.id, err);
            }
        })
    }

    fn bump(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Destroyed {
            return Err(MemoryError::pool_destroyed(self.id));
        }

        if let Some(ptr) = inner.nodes.last_mut().and_then(|node| node.bump(size)) {
            inner.allocated += size;
            return Ok(ptr);
        }

        let mut node = self.allocator.alloc(size)?;
        let Some(ptr) = node.bump(size) else {
            self.allocator.free(node);
            return Err(MemoryError::size_overflow("memnode smaller than request"));
        };
        inner.nodes.push(node);
        inner.allocated += size;
        Ok(ptr)
    }

    fn register(
        &self,
        stage: Stage,
        run: CleanupFn,
        child: Option<CleanupFn>,
    ) -> MemoryResult<CleanupId> {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Destroyed {
            return Err(MemoryError::pool_destroyed(self.id));
        }
        Ok(inner.cleanups.register(stage, run, child))
    }

    fn not_found(&self, id: CleanupId) -> MemoryError {
        MemoryError::CleanupNotFound {
            pool: self.id,
            id: id.get(),
        }
    }

    fn run_cleanups(&self, stage: Stage) {
        loop {
            let next = self.inner.lock().cleanups.pop(stage);
            let Some((id, run)) = next else {
                break;
            };
            report_cleanup(self.id, id, run());
        }
    }

    fn run_child_cleanups(&self) {
        loop {
            let next = self.inner.lock().cleanups.pop_child();
            let Some((id, run)) = next else {
                break;
            };
            report_cleanup(self.id, id, run());
        }
    }

    fn take_children(&self) -> Vec<Arc<PoolShared>> {
        std::mem::take(&mut self.inner.lock().children)
    }

    fn begin_destroy(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Active {
            return false;
        }
        inner.lifecycle = Lifecycle::Destroying;
        true
    }

    /// Returns the node chain; a cleared pool keeps its reset self-node.
    fn release_memory(&self, destroy: bool) {
        let (nodes, userdata, cleanups) = {
            let mut inner = self.inner.lock();
            let mut nodes = std::mem::take(&mut inner.nodes);
            if !destroy && !nodes.is_empty() {
                let mut self_node = nodes.swap_remove(0);
                self_node.reset();
                inner.nodes.push(self_node);
            }
            inner.allocated = 0;
            if destroy {
                inner.lifecycle = Lifecycle::Destroyed;
            }
            (
                nodes,
                std::mem::take(&mut inner.userdata),
                std::mem::take(&mut inner.cleanups),
            )
        };
        drop(userdata);
        drop(cleanups);
        self.allocator.free_chain(nodes);

        if destroy && self.owns_allocator {
            self.allocator.owner_set(None);
            self.allocator.destroy();
        }
    }

    fn unlink_from_parent(self: &Arc<Self>) {
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent
                .inner
                .lock()
                .children
                .retain(|child| !Arc::ptr_eq(child, self));
        }
    }
}

fn invoke_abort(handler: Option<&AbortHandler>, pool: PoolId, err: &MemoryError) {
    #[cfg(feature = "logging")]
    tracing::error!(%pool, error = %err, has_handler = handler.is_some(), "pool allocation failed");
    #[cfg(not(feature = "logging"))]
    let _ = pool;

    if let Some(handler) = handler {
        handler(err);
    }
}

fn report_cleanup(pool: PoolId, id: CleanupId, result: CleanupResult) {
    if let Err(err) = result {
        #[cfg(feature = "logging")]
        tracing::warn!(%pool, cleanup = %id, error = %err, "pool cleanup failed");
        #[cfg(not(feature = "logging"))]
        let _ = (pool, id, err);
    }
}

/// Post-order teardown of `root`'s subtree.
fn teardown(root: &Arc<PoolShared>, mode: Teardown) {
    enum Step {
        Enter(Arc<PoolShared>, bool),
        Leave(Arc<PoolShared>, bool),
    }

    #[cfg(feature = "logging")]
    tracing::debug!(pool = %root.id, ?mode, "pool teardown");

    let mut stack = vec![Step::Enter(Arc::clone(root), mode == Teardown::Destroy)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(pool, destroy) => {
                if destroy && !pool.begin_destroy() {
                    continue;
                }
                pool.run_cleanups(Stage::Pre);
                let children = pool.take_children();
                stack.push(Step::Leave(pool, destroy));
                // Newest child on top: destroyed first.
                stack.extend(children.into_iter().map(|child| Step::Enter(child, true)));
            }
            Step::Leave(pool, destroy) => {
                pool.run_cleanups(Stage::Plain);
                // Cleanups may have created children or registered more cleanups.
                let late = pool.take_children();
                let pending = pool.inner.lock().cleanups.len() > 0;
                if !late.is_empty() || pending {
                    pool.run_cleanups(Stage::Pre);
                    stack.push(Step::Leave(pool, destroy));
                    stack.extend(late.into_iter().map(|child| Step::Enter(child, true)));
                    continue;
                }
                pool.release_memory(destroy);
            }
        }
    }

    if mode == Teardown::Destroy {
        root.unlink_from_parent();
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Non-owning handle to a pool.
///
/// Holding a `PoolRef` never keeps the pool's memory or children alive past
/// its destruction; it only keeps the handle itself valid.
#[derive(Clone)]
pub struct PoolRef {
    shared: Arc<PoolShared>,
}

impl PoolRef {
    /// Unique id of the pool
    pub fn id(&self) -> PoolId {
        self.shared.id
    }

    /// Handle that does not keep the pool's bookkeeping alive.
    pub fn downgrade(&self) -> WeakPool {
        WeakPool {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Debugging tag
    pub fn tag(&self) -> Option<Arc<str>> {
        self.shared.tag.lock().clone()
    }

    /// Replaces the debugging tag
    pub fn tag_set(&self, tag: impl Into<String>) {
        *self.shared.tag.lock() = Some(Arc::from(tag.into()));
    }

    /// Parent pool, `None` for roots (and once the parent is gone)
    pub fn parent(&self) -> Option<PoolRef> {
        self.shared
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|shared| PoolRef { shared })
    }

    /// Allocator this pool draws its memnodes from
    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.shared.allocator
    }

    /// Abort handler in effect for this pool
    pub fn abort_get(&self) -> Option<AbortHandler> {
        self.shared.abort.lock().clone()
    }

    /// Replaces the abort handler. Existing children keep the one they captured.
    pub fn abort_set(&self, abort: Option<AbortHandler>) {
        *self.shared.abort.lock() = abort;
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.inner.lock().lifecycle
    }

    /// `true` once the pool has been destroyed (directly or by an ancestor)
    pub fn is_destroyed(&self) -> bool {
        self.lifecycle() == Lifecycle::Destroyed
    }

    /// `true` if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &PoolRef) -> bool {
        is_ancestor(Some(self), other)
    }

    /// Creates a child pool sharing this pool's allocator and abort handler.
    pub fn create_child(&self) -> MemoryResult<Pool> {
        self.create_child_with(PoolOptions::default())
    }

    /// Creates a child pool with explicit options.
    pub fn create_child_with(&self, options: PoolOptions) -> MemoryResult<Pool> {
        PoolShared::create(Some(&self.shared), None, options).map(Pool::from_shared)
    }

    /// Number of live child pools
    pub fn child_count(&self) -> usize {
        self.shared.inner.lock().children.len()
    }

    // ---- allocation --------------------------------------------------------

    /// Bump-allocates `size` bytes aligned to [`MIN_ALIGN`](alignment::MIN_ALIGN).
    ///
    /// On allocation failure the abort handler runs first; if it returns, the
    /// error is handed back to the caller.
    pub fn palloc(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        self.shared.palloc(size)
    }

    /// Like [`palloc`](Self::palloc), with the returned bytes zeroed.
    pub fn pcalloc(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let ptr = self.palloc(size)?;
        // SAFETY: `palloc` returned at least `size` writable bytes owned by this pool.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    /// Bytes handed out since the last clear (after alignment)
    pub fn bytes_in_pool(&self) -> usize {
        self.shared.inner.lock().allocated
    }

    /// Capacity of the memnodes currently held by the pool
    pub fn bytes_reserved(&self) -> usize {
        self.shared
            .inner
            .lock()
            .nodes
            .iter()
            .map(MemNode::capacity)
            .sum()
    }

    /// Number of memnodes in the pool's chain
    pub fn node_count(&self) -> usize {
        self.shared.inner.lock().nodes.len()
    }

    /// Destroys all children, runs all cleanups and returns every memnode
    /// except the self-node. The pool stays usable.
    ///
    /// Pointers previously returned by this pool or its children dangle
    /// afterwards.
    pub fn clear(&self) {
        if self.lifecycle() == Lifecycle::Active {
            teardown(&self.shared, Teardown::Clear);
        }
    }

    // ---- cleanups ----------------------------------------------------------

    /// Registers a cleanup run on clear/destroy, after the children are gone.
    ///
    /// Cleanups run newest first.
    pub fn cleanup_register(
        &self,
        cleanup: impl FnOnce() -> CleanupResult + Send + 'static,
    ) -> MemoryResult<CleanupId> {
        self.shared.register(Stage::Plain, Box::new(cleanup), None)
    }

    /// Registers a cleanup plus a hook for forked children.
    pub fn cleanup_register_with_child(
        &self,
        cleanup: impl FnOnce() -> CleanupResult + Send + 'static,
        child: impl FnOnce() -> CleanupResult + Send + 'static,
    ) -> MemoryResult<CleanupId> {
        self.shared
            .register(Stage::Plain, Box::new(cleanup), Some(Box::new(child)))
    }

    /// Registers a cleanup run before the pool's children are destroyed.
    pub fn pre_cleanup_register(
        &self,
        cleanup: impl FnOnce() -> CleanupResult + Send + 'static,
    ) -> MemoryResult<CleanupId> {
        self.shared.register(Stage::Pre, Box::new(cleanup), None)
    }

    /// Replaces the fork hook of an existing registration.
    pub fn child_cleanup_set(
        &self,
        id: CleanupId,
        child: impl FnOnce() -> CleanupResult + Send + 'static,
    ) -> MemoryResult<()> {
        let replaced = self.shared.inner.lock().cleanups.set_child(id, Box::new(child));
        if replaced {
            Ok(())
        } else {
            Err(self.shared.not_found(id))
        }
    }

    /// Unregisters a cleanup without running it.
    pub fn cleanup_kill(&self, id: CleanupId) -> MemoryResult<()> {
        let removed = self.shared.inner.lock().cleanups.remove(id);
        match removed {
            Some(cleanup) => {
                drop(cleanup);
                Ok(())
            }
            None => Err(self.shared.not_found(id)),
        }
    }

    /// Unregisters a cleanup and runs it now, returning its result.
    pub fn cleanup_run(&self, id: CleanupId) -> MemoryResult<CleanupResult> {
        let removed = self.shared.inner.lock().cleanups.remove(id);
        let cleanup = removed.ok_or_else(|| self.shared.not_found(id))?;
        Ok(cleanup())
    }

    /// Runs (and consumes) the fork hooks of this pool only.
    pub fn run_child_cleanups(&self) {
        self.shared.run_child_cleanups();
    }

    /// Runs (and consumes) the fork hooks of this pool and every descendant.
    ///
    /// Meant to be called in a freshly forked child before `exec`. On targets
    /// without `fork` nothing calls it implicitly.
    pub fn cleanup_for_exec(&self) {
        let mut stack = vec![Arc::clone(&self.shared)];
        while let Some(pool) = stack.pop() {
            pool.run_child_cleanups();
            stack.extend(pool.inner.lock().children.iter().cloned());
        }
    }

    // ---- userdata ----------------------------------------------------------

    /// Attaches `value` under `key`, replacing any previous value.
    ///
    /// Userdata is dropped when the pool is cleared or destroyed.
    pub fn userdata_set<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
    ) -> MemoryResult<()> {
        let mut inner = self.shared.inner.lock();
        if inner.lifecycle == Lifecycle::Destroyed {
            return Err(MemoryError::pool_destroyed(self.shared.id));
        }
        let previous = inner.userdata.insert(key.into(), value);
        drop(inner);
        drop(previous);
        Ok(())
    }

    /// Attaches `value` under `key` and registers `cleanup` to receive it when
    /// the pool is cleared or destroyed.
    pub fn userdata_set_with_cleanup<T, F>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
        cleanup: F,
    ) -> MemoryResult<CleanupId>
    where
        T: Any + Send + Sync,
        F: FnOnce(Arc<T>) -> CleanupResult + Send + 'static,
    {
        self.userdata_set(key, Arc::clone(&value))?;
        self.cleanup_register(move || cleanup(value))
    }

    /// Looks up userdata by key and type.
    pub fn userdata_get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.shared.inner.lock().userdata.get(key).cloned()?;
        value.downcast::<T>().ok()
    }
}

impl PartialEq for PoolRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for PoolRef {}

impl fmt::Debug for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRef")
            .field("id", &self.shared.id)
            .field("tag", &self.tag())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

/// Weak handle to a pool, for collaborators that register cleanups on a pool
/// they must not keep reachable.
#[derive(Clone, Default)]
pub struct WeakPool {
    shared: Weak<PoolShared>,
}

impl WeakPool {
    /// `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<PoolRef> {
        self.shared.upgrade().map(|shared| PoolRef { shared })
    }
}

impl fmt::Debug for WeakPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(pool) => f.debug_tuple("WeakPool").field(&pool.id()).finish(),
            None => f.write_str("WeakPool(<gone>)"),
        }
    }
}

/// `true` if `a` is `b` or one of its ancestors. `None` is an ancestor of
/// every pool.
pub fn is_ancestor(a: Option<&PoolRef>, b: &PoolRef) -> bool {
    let Some(a) = a else {
        return true;
    };
    let mut current = Some(Arc::clone(&b.shared));
    while let Some(pool) = current {
        if Arc::ptr_eq(&pool, &a.shared) {
            return true;
        }
        current = pool.parent.as_ref().and_then(Weak::upgrade);
    }
    false
}

/// Owning handle to a pool; dropping it destroys the pool and its subtree.
pub struct Pool {
    handle: PoolRef,
}

impl Pool {
    /// Root pool with a private allocator
    pub fn new() -> MemoryResult<Self> {
        Self::with_options(None, PoolOptions::default())
    }

    /// Pool under `parent` (a root when `None`) with explicit options.
    pub fn with_options(parent: Option<&PoolRef>, options: PoolOptions) -> MemoryResult<Self> {
        PoolShared::create(parent.map(|p| &p.shared), None, options).map(Self::from_shared)
    }

    /// Root pool drawing from an existing allocator.
    ///
    /// The pool does not take ownership of the allocator.
    pub fn with_allocator(allocator: Arc<Allocator>, options: PoolOptions) -> MemoryResult<Self> {
        PoolShared::create(None, Some(allocator), options).map(Self::from_shared)
    }

    fn from_shared(shared: Arc<PoolShared>) -> Self {
        Self {
            handle: PoolRef { shared },
        }
    }

    /// Non-owning handle to this pool
    pub fn handle(&self) -> PoolRef {
        self.handle.clone()
    }

    /// Gives up ownership: the pool now lives until an ancestor is cleared or
    /// destroyed. A root pool given up this way is never destroyed.
    pub fn into_ref(self) -> PoolRef {
        let this = core::mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped or used again, so moving the handle
        // out cannot produce a double drop.
        unsafe { core::ptr::read(&this.handle) }
    }

    /// Destroys the pool: clear, then return the self-node and unlink from the
    /// parent. A private allocator is drained.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Deref for Pool {
    type Target = PoolRef;

    fn deref(&self) -> &PoolRef {
        &self.handle
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        teardown(&self.handle.shared, Teardown::Destroy);
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pool").field(&self.handle).finish()
    }
}
