//! Size-classed memnode allocator.
//!
//! The [`Allocator`] caches freed [`MemNode`]s in buckets indexed by size class
//! and only goes to its [`MemorySource`] when no cached node is large enough.
//! Bucket `0` is the sink for nodes too large for a dedicated bucket; it is
//! searched first-fit.
//!
//! ## Thresholds
//!
//! With `max_free` set, every free that pushes the cached byte total over the
//! threshold releases cached nodes back to the source, smallest class first,
//! so large reusable nodes survive longest.
//!
//! ## Locking
//!
//! The free lists always sit behind an internal `parking_lot::Mutex`. That lock
//! alone makes an `Allocator` safe to share between pools on different
//! threads.
//!
//! The mutex attached with [`Allocator::mutex_set`] (or by
//! [`AllocatorConfig::locked`]) adds no safety on top of it. It is an external
//! serialization hook: the allocator takes it around every free-list mutation,
//! so callers holding the same `Arc` can exclude allocator traffic for a while
//! or serialize several allocators behind one lock.

mod config;
mod node;
mod source;

use core::alloc::Layout;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub use config::{AllocatorConfig, MAX_FREE_UNLIMITED};
pub use node::MemNode;
pub use source::{MemorySource, SystemSource};

use crate::core::alignment::MIN_ALIGN;
use crate::core::class::{self, MAX_INDEX};
use crate::core::PoolId;
use crate::error::{MemoryError, MemoryResult};

/// Serialization lock that can be attached to one or more allocators.
pub type AllocatorMutex = Arc<Mutex<()>>;

/// Point-in-time counters of an [`Allocator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Nodes ever obtained from the memory source
    pub os_allocations: u64,
    /// Nodes ever returned to the memory source
    pub os_releases: u64,
    /// Bytes currently cached in the free lists
    pub free_bytes: usize,
    /// Nodes currently cached in the free lists
    pub free_nodes: usize,
}

struct FreeLists {
    buckets: [Vec<MemNode>; MAX_INDEX],
    /// Largest non-empty dedicated bucket (0 when all are empty)
    max_index: usize,
    max_free: Option<usize>,
    free_bytes: usize,
    free_nodes: usize,
}

impl FreeLists {
    fn new(max_free: Option<usize>) -> Self {
        Self {
            buckets: std::array::from_fn(|_| Vec::new()),
            max_index: 0,
            max_free,
            free_bytes: 0,
            free_nodes: 0,
        }
    }

    /// Pops the smallest cached node of class `index` or larger.
    fn take(&mut self, index: usize) -> Option<MemNode> {
        if index <= self.max_index {
            let bucket = (index.max(1)..=self.max_index).find(|&i| !self.buckets[i].is_empty())?;
            let node = self.buckets[bucket].pop()?;
            if bucket == self.max_index {
                self.recompute_max_index();
            }
            return Some(self.account_taken(node));
        }

        let sink = &mut self.buckets[0];
        let pos = sink.iter().position(|node| node.index() >= index)?;
        let node = sink.swap_remove(pos);
        Some(self.account_taken(node))
    }

    fn put(&mut self, node: MemNode) {
        let bucket = class::bucket_of(node.index());
        if bucket > self.max_index {
            self.max_index = bucket;
        }
        self.free_bytes += node.capacity();
        self.free_nodes += 1;
        self.buckets[bucket].push(node);
    }

    /// Removes cached nodes, smallest class first, until the threshold holds.
    fn drain_excess(&mut self, out: &mut Vec<MemNode>) {
        let Some(max_free) = self.max_free else {
            return;
        };
        // Dedicated buckets in ascending class order, then the sink.
        let order = (1..MAX_INDEX).chain(core::iter::once(0));
        for bucket in order {
            while self.free_bytes > max_free {
                let Some(node) = self.buckets[bucket].pop() else {
                    break;
                };
                out.push(self.account_taken(node));
            }
            if self.free_bytes <= max_free {
                break;
            }
        }
        self.recompute_max_index();
    }

    fn drain_all(&mut self, out: &mut Vec<MemNode>) {
        for bucket in &mut self.buckets {
            out.append(bucket);
        }
        self.max_index = 0;
        self.free_bytes = 0;
        self.free_nodes = 0;
    }

    fn account_taken(&mut self, node: MemNode) -> MemNode {
        self.free_bytes -= node.capacity();
        self.free_nodes -= 1;
        node
    }

    fn recompute_max_index(&mut self) {
        self.max_index = (1..MAX_INDEX)
            .rev()
            .find(|&i| !self.buckets[i].is_empty())
            .unwrap_or(0);
    }
}

/// Size-classed cache of memnodes shared by one or more pools.
pub struct Allocator {
    source: Arc<dyn MemorySource>,
    lists: Mutex<FreeLists>,
    mutex: Mutex<Option<AllocatorMutex>>,
    owner: Mutex<Option<PoolId>>,
    os_allocations: AtomicU64,
    os_releases: AtomicU64,
}

impl Allocator {
    /// Empty allocator: no cached nodes, unlimited `max_free`, no mutex, no owner.
    pub fn new() -> Self {
        Self::with_config(&AllocatorConfig::default())
    }

    /// Allocator drawing from the global allocator with `config` applied.
    pub fn with_config(config: &AllocatorConfig) -> Self {
        Self::with_source(config, Arc::new(SystemSource))
    }

    /// Allocator drawing its nodes from `source`.
    pub fn with_source(config: &AllocatorConfig, source: Arc<dyn MemorySource>) -> Self {
        let mutex = config.locked.then(|| Arc::new(Mutex::new(())));
        Self {
            source,
            lists: Mutex::new(FreeLists::new(config.max_free)),
            mutex: Mutex::new(mutex),
            owner: Mutex::new(None),
            os_allocations: AtomicU64::new(0),
            os_releases: AtomicU64::new(0),
        }
    }

    /// Hands out a node with at least `size` usable bytes.
    ///
    /// Reuses the smallest sufficient cached node, otherwise carves a new one
    /// from the memory source. Source failure is reported as
    /// [`MemoryError::OutOfMemory`]; the allocator itself never aborts.
    pub fn alloc(&self, size: usize) -> MemoryResult<MemNode> {
        let node_size =
            class::node_size(size).ok_or_else(|| MemoryError::size_overflow("memnode size"))?;
        let index = class::index_of(node_size);

        if let Some(mut node) = self.with_lists(|lists| lists.take(index)) {
            node.reset();
            return Ok(node);
        }

        let layout = Layout::from_size_align(node_size, MIN_ALIGN)
            .map_err(|_| MemoryError::invalid_layout("memnode exceeds isize::MAX"))?;
        let base = self
            .source
            .allocate(layout)
            .ok_or_else(|| MemoryError::out_of_memory_with_layout(layout))?;
        self.os_allocations.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        tracing::trace!(size = node_size, index, "carved memnode");

        Ok(MemNode::new(base, layout, index))
    }

    /// Returns one node to the free lists.
    pub fn free(&self, node: MemNode) {
        self.free_chain(core::iter::once(node));
    }

    /// Returns a chain of nodes, then enforces `max_free` once.
    pub fn free_chain(&self, nodes: impl IntoIterator<Item = MemNode>) {
        let mut excess = Vec::new();
        self.with_lists(|lists| {
            for node in nodes {
                lists.put(node);
            }
            lists.drain_excess(&mut excess);
        });
        self.release(excess);
    }

    /// Sets the free-byte threshold; [`MAX_FREE_UNLIMITED`] removes it.
    ///
    /// Lowering the threshold releases the surplus immediately.
    pub fn max_free_set(&self, max_free: usize) {
        let mut excess = Vec::new();
        self.with_lists(|lists| {
            lists.max_free = config::normalize_max_free(max_free);
            lists.drain_excess(&mut excess);
        });
        self.release(excess);
    }

    /// Current free-byte threshold
    pub fn max_free_get(&self) -> Option<usize> {
        self.lists.lock().max_free
    }

    /// Records the pool responsible for destroying this allocator.
    pub fn owner_set(&self, owner: Option<PoolId>) {
        *self.owner.lock() = owner;
    }

    /// Pool responsible for destroying this allocator
    pub fn owner_get(&self) -> Option<PoolId> {
        *self.owner.lock()
    }

    /// Installs (or removes) the external serialization mutex.
    ///
    /// Thread safety never depends on it; see the module docs.
    pub fn mutex_set(&self, mutex: Option<AllocatorMutex>) {
        *self.mutex.lock() = mutex;
    }

    /// Serialization mutex, if any
    pub fn mutex_get(&self) -> Option<AllocatorMutex> {
        self.mutex.lock().clone()
    }

    /// Releases every cached node to the memory source.
    ///
    /// Nodes currently held by pools are untouched.
    pub fn destroy(&self) {
        let mut nodes = Vec::new();
        self.with_lists(|lists| lists.drain_all(&mut nodes));
        self.release(nodes);
    }

    /// Snapshot of the allocator counters
    pub fn stats(&self) -> AllocatorStats {
        let lists = self.lists.lock();
        AllocatorStats {
            os_allocations: self.os_allocations.load(Ordering::Relaxed),
            os_releases: self.os_releases.load(Ordering::Relaxed),
            free_bytes: lists.free_bytes,
            free_nodes: lists.free_nodes,
        }
    }

    fn with_lists<R>(&self, f: impl FnOnce(&mut FreeLists) -> R) -> R {
        let serial = self.mutex.lock().clone();
        let _serial = serial.as_ref().map(|mutex| mutex.lock());
        let mut lists = self.lists.lock();
        f(&mut lists)
    }

    fn release(&self, nodes: Vec<MemNode>) {
        if nodes.is_empty() {
            return;
        }
        #[cfg(feature = "logging")]
        tracing::trace!(count = nodes.len(), "releasing memnodes to the memory source");

        for node in nodes {
            // SAFETY: every node was carved from `self.source` with its own layout,
            // and ownership ends here.
            unsafe { self.source.release(node.as_ptr(), node.layout()) };
            self.os_releases.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("stats", &self.stats())
            .field("max_free", &self.max_free_get())
            .field("owner", &self.owner_get())
            .field("locked", &self.mutex.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::class::{BOUNDARY_SIZE, MIN_ALLOC};

    #[test]
    fn test_alloc_rounds_to_class() {
        let allocator = Allocator::new();
        let node = allocator.alloc(100).unwrap();
        assert_eq!(node.capacity(), MIN_ALLOC);
        assert_eq!(node.index(), 1);

        let big = allocator.alloc(MIN_ALLOC + 1).unwrap();
        assert_eq!(big.capacity(), MIN_ALLOC + BOUNDARY_SIZE);
        allocator.free(node);
        allocator.free(big);
    }

    #[test]
    fn test_free_then_alloc_reuses_node() {
        let allocator = Allocator::new();
        let node = allocator.alloc(1000).unwrap();
        let addr = node.as_ptr();
        allocator.free(node);

        let again = allocator.alloc(1000).unwrap();
        assert_eq!(again.as_ptr(), addr);
        assert_eq!(allocator.stats().os_allocations, 1);
        allocator.free(again);
    }

    #[test]
    fn test_reused_node_has_reset_cursor() {
        let allocator = Allocator::new();
        let mut node = allocator.alloc(0).unwrap();
        node.bump(512).unwrap();
        allocator.free(node);
        let node = allocator.alloc(0).unwrap();
        assert_eq!(node.used(), 0);
        allocator.free(node);
    }

    #[test]
    fn test_larger_cached_node_serves_smaller_request() {
        let allocator = Allocator::new();
        let big = allocator.alloc(10 * BOUNDARY_SIZE).unwrap();
        allocator.free(big);
        let small = allocator.alloc(64).unwrap();
        assert_eq!(small.capacity(), 10 * BOUNDARY_SIZE);
        assert_eq!(allocator.stats().os_allocations, 1);
        allocator.free(small);
    }

    #[test]
    fn test_sink_first_fit() {
        let allocator = Allocator::new();
        let huge = allocator.alloc(MAX_INDEX * BOUNDARY_SIZE * 2).unwrap();
        let huge_size = huge.capacity();
        allocator.free(huge);

        let stats = allocator.stats();
        assert_eq!(stats.free_nodes, 1);
        assert_eq!(stats.free_bytes, huge_size);

        let reused = allocator.alloc(MAX_INDEX * BOUNDARY_SIZE + 1).unwrap();
        assert_eq!(reused.capacity(), huge_size);
        allocator.free(reused);
    }

    #[test]
    fn test_max_free_releases_smallest_first() {
        let allocator = Allocator::with_config(&AllocatorConfig::bounded(6 * BOUNDARY_SIZE));
        let small = allocator.alloc(0).unwrap();
        let large = allocator.alloc(5 * BOUNDARY_SIZE).unwrap();
        let large_size = large.capacity();

        allocator.free(large);
        assert_eq!(allocator.stats().free_bytes, large_size);

        allocator.free(small);
        let stats = allocator.stats();
        assert_eq!(stats.os_releases, 1);
        assert_eq!(stats.free_bytes, large_size);
        assert!(stats.free_bytes <= 6 * BOUNDARY_SIZE);
    }

    #[test]
    fn test_lowering_max_free_trims_cache() {
        let allocator = Allocator::new();
        let nodes: Vec<_> = (0..4).map(|_| allocator.alloc(0).unwrap()).collect();
        allocator.free_chain(nodes);
        assert_eq!(allocator.stats().free_nodes, 4);

        allocator.max_free_set(2 * MIN_ALLOC);
        let stats = allocator.stats();
        assert_eq!(stats.free_nodes, 2);
        assert_eq!(stats.os_releases, 2);
        assert_eq!(allocator.max_free_get(), Some(2 * MIN_ALLOC));

        allocator.max_free_set(MAX_FREE_UNLIMITED);
        assert_eq!(allocator.max_free_get(), None);
    }

    #[test]
    fn test_destroy_drains_everything() {
        let allocator = Allocator::new();
        let a = allocator.alloc(0).unwrap();
        let b = allocator.alloc(30 * BOUNDARY_SIZE).unwrap();
        allocator.free_chain([a, b]);
        allocator.destroy();

        let stats = allocator.stats();
        assert_eq!(stats.free_nodes, 0);
        assert_eq!(stats.free_bytes, 0);
        assert_eq!(stats.os_releases, 2);
    }

    #[test]
    fn test_owner_and_mutex_accessors() {
        let allocator = Allocator::new();
        assert!(allocator.owner_get().is_none());
        assert!(allocator.mutex_get().is_none());

        let owner = PoolId::next();
        allocator.owner_set(Some(owner));
        assert_eq!(allocator.owner_get(), Some(owner));

        let shared: AllocatorMutex = Arc::new(Mutex::new(()));
        allocator.mutex_set(Some(Arc::clone(&shared)));
        assert!(Arc::ptr_eq(&allocator.mutex_get().unwrap(), &shared));
        assert!(Allocator::with_config(&AllocatorConfig::locked()).mutex_get().is_some());
    }

    #[test]
    fn test_serialization_mutex_is_held_during_free() {
        let allocator = Arc::new(Allocator::new());
        let shared: AllocatorMutex = Arc::new(Mutex::new(()));
        allocator.mutex_set(Some(Arc::clone(&shared)));

        let node = allocator.alloc(0).unwrap();
        let guard = shared.lock();
        let worker = {
            let allocator = Arc::clone(&allocator);
            std::thread::spawn(move || allocator.free(node))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(allocator.stats().free_nodes, 0);
        drop(guard);
        worker.join().unwrap();
        assert_eq!(allocator.stats().free_nodes, 1);
    }

    #[test]
    fn test_internal_lock_alone_is_thread_safe() {
        let allocator = Arc::new(Allocator::new());
        assert!(allocator.mutex_get().is_none());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let node = allocator.alloc(0).unwrap();
                        allocator.free(node);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = allocator.stats();
        assert!(stats.os_allocations <= 4);
        let outstanding = stats.os_allocations - stats.os_releases;
        assert_eq!(u64::try_from(stats.free_nodes).unwrap(), outstanding);
    }

    #[test]
    fn test_detached_serialization_mutex_no_longer_blocks() {
        let allocator = Allocator::new();
        let shared: AllocatorMutex = Arc::new(Mutex::new(()));
        allocator.mutex_set(Some(Arc::clone(&shared)));
        allocator.mutex_set(None);

        let _guard = shared.lock();
        let node = allocator.alloc(0).unwrap();
        allocator.free(node);
        assert_eq!(allocator.stats().free_nodes, 1);
    }

    #[test]
    fn test_allocator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Allocator>();
    }
}
