//! Bounded list of reusable resources
//!
//! A [`ResList`] keeps between `min` and `hmax` instances of a user
//! [`Resource`] alive. Idle instances sit in a ring, newest at the front.
//! Acquirers take from the front (LIFO) or the back (FIFO); releases push to
//! the front. Instances idle past the ttl are destroyed from the back while
//! more than `smax` are idle.
//!
//! ## Counters
//!
//! - `ntotal`: instances in existence, idle or checked out
//! - `nidle`: instances in the ring
//!
//! `0 <= nidle <= ntotal <= hmax` holds whenever the state lock is released.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use regio_memory::pool::{CleanupId, PoolRef, WeakPool};
use tracing::{debug, trace, warn};

use crate::config::ResListConfig;
use crate::error::{BoxError, Error, Result};
use crate::guard::Lease;
use crate::resource::Resource;
use crate::ring::Ring;

/// Which idle instance `acquire` hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcquireOrder {
    /// Most recently released first
    #[default]
    Lifo,
    /// Longest idle first
    Fifo,
}

/// When the list is torn down relative to its pool's children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupOrder {
    /// Before the pool's children are destroyed
    First,
    /// After the pool's children are destroyed
    #[default]
    Last,
}

struct Idle<T> {
    instance: T,
    /// Set only while a ttl is configured
    freed: Option<Instant>,
}

struct State<T> {
    config: ResListConfig,
    ntotal: usize,
    idle: Ring<Idle<T>>,
    destroyed: bool,
}

impl<T> State<T> {
    fn is_exhausted(&self) -> bool {
        self.idle.is_empty() && self.ntotal >= self.config.hmax
    }

    fn pop(&mut self, order: AcquireOrder) -> Option<T> {
        let idle = match order {
            AcquireOrder::Lifo => self.idle.pop_front(),
            AcquireOrder::Fifo => self.idle.pop_back(),
        }?;
        Some(idle.instance)
    }

    fn push(&mut self, instance: T) {
        let freed = self.config.ttl.map(|_| Instant::now());
        self.idle.push_front(Idle { instance, freed });
    }
}

/// State shared between the list handle, its leases and the pool cleanup.
pub(crate) struct Shared<R: Resource> {
    resource: R,
    state: Mutex<State<R::Instance>>,
    available: Condvar,
    pool: Option<WeakPool>,
    registration: Mutex<Option<CleanupId>>,
}

impl<R: Resource> Shared<R> {
    fn construct(&self) -> Result<R::Instance> {
        self.resource
            .create()
            .map_err(|source| Error::Constructor { source })
    }

    fn dispose(&self, instance: R::Instance) -> Result<()> {
        self.resource
            .destroy(instance)
            .map_err(|source| Error::Destructor { source })
    }

    /// Tops the idle set up to `min`, then expires surplus if none were built.
    fn maintain_locked(&self, state: &mut State<R::Instance>) -> Result<()> {
        let mut created = 0_usize;
        while state.idle.len() < state.config.min && state.ntotal < state.config.hmax {
            let instance = self.construct()?;
            state.ntotal += 1;
            state.push(instance);
            created += 1;
            self.available.notify_one();
        }
        if created > 0 {
            trace!(created, ntotal = state.ntotal, "resource list topped up");
            return Ok(());
        }
        self.expire_locked(state, Instant::now())
    }

    /// Destroys idle instances older than the ttl, oldest first, while more
    /// than `smax` are idle.
    fn expire_locked(&self, state: &mut State<R::Instance>, now: Instant) -> Result<()> {
        let Some(ttl) = state.config.ttl else {
            return Ok(());
        };
        let mut expired = 0_usize;
        while state.idle.len() > state.config.smax {
            let stale = state
                .idle
                .back()
                .and_then(|idle| idle.freed)
                .is_some_and(|freed| now.saturating_duration_since(freed) >= ttl);
            if !stale {
                break;
            }
            let Some(idle) = state.idle.pop_back() else {
                break;
            };
            state.ntotal -= 1;
            expired += 1;
            self.dispose(idle.instance)?;
        }
        if expired > 0 {
            trace!(expired, ntotal = state.ntotal, "expired idle resources");
        }
        Ok(())
    }

    pub(crate) fn acquire(&self, order: AcquireOrder) -> Result<R::Instance> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed);
        }
        self.expire_locked(&mut state, Instant::now())?;
        if let Some(instance) = state.pop(order) {
            return Ok(instance);
        }

        let deadline = state
            .config
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        while state.is_exhausted() {
            self.wait_for_slot(&mut state, deadline)?;
            if state.destroyed {
                return Err(Error::Destroyed);
            }
        }
        if let Some(instance) = state.pop(order) {
            return Ok(instance);
        }

        if state.ntotal >= state.config.hmax {
            return Err(Error::internal(format!(
                "about to exceed hmax: ntotal {} >= hmax {}",
                state.ntotal, state.config.hmax
            )));
        }
        let instance = self.construct()?;
        state.ntotal += 1;
        Ok(instance)
    }

    /// Blocks until signalled or the deadline passes. A timeout only counts
    /// when the list is still exhausted afterwards.
    #[cfg(feature = "threads")]
    fn wait_for_slot(
        &self,
        state: &mut MutexGuard<'_, State<R::Instance>>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        match deadline {
            Some(deadline) => {
                let result = self.available.wait_until(state, deadline);
                if result.timed_out() && state.is_exhausted() && !state.destroyed {
                    let timeout = state.config.timeout.unwrap_or(Duration::ZERO);
                    debug!(?timeout, "acquire timed out");
                    return Err(Error::Timeout { timeout });
                }
            }
            None => self.available.wait(state),
        }
        Ok(())
    }

    #[cfg(not(feature = "threads"))]
    fn wait_for_slot(
        &self,
        _state: &mut MutexGuard<'_, State<R::Instance>>,
        _deadline: Option<Instant>,
    ) -> Result<()> {
        Err(Error::WouldBlock)
    }

    pub(crate) fn release(&self, instance: R::Instance) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            state.ntotal = state.ntotal.saturating_sub(1);
            drop(state);
            trace!("resource released after destroy, disposing");
            return self.dispose(instance);
        }
        debug_assert!(
            state.idle.len() < state.ntotal,
            "release of an instance this list did not hand out"
        );
        state.push(instance);
        self.available.notify_one();
        self.maintain_locked(&mut state)
    }

    pub(crate) fn invalidate(&self, instance: R::Instance) -> Result<()> {
        let mut state = self.state.lock();
        debug_assert!(state.ntotal > 0, "invalidate without outstanding resource");
        state.ntotal = state.ntotal.saturating_sub(1);
        let result = self.dispose(instance);
        self.available.notify_one();
        trace!(ntotal = state.ntotal, "resource invalidated");
        result
    }

    /// Destroys every idle instance and marks the list destroyed.
    ///
    /// Idempotent. Keeps disposing after a destructor error and reports the
    /// first one; otherwise reports instances still checked out.
    fn teardown(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Ok(());
        }
        state.destroyed = true;

        let mut first_error = None;
        while let Some(idle) = state.idle.pop_front() {
            state.ntotal -= 1;
            if let Err(error) = self.dispose(idle.instance) {
                first_error.get_or_insert(error);
            }
        }
        let outstanding = state.ntotal;
        self.available.notify_all();
        drop(state);

        if let Some(error) = first_error {
            warn!(%error, "destructor failed while destroying resource list");
            return Err(error);
        }
        if outstanding > 0 {
            warn!(outstanding, "resource list destroyed with resources checked out");
            return Err(Error::Outstanding { count: outstanding });
        }
        debug!("resource list destroyed");
        Ok(())
    }
}

/// Registers `shared` for teardown when `pool` is cleared or destroyed.
fn register_cleanup<R: Resource>(
    shared: &Arc<Shared<R>>,
    pool: &PoolRef,
    order: CleanupOrder,
) -> Result<CleanupId> {
    let target = Arc::clone(shared);
    let cleanup = move || target.teardown().map_err(BoxError::from);
    let id = match order {
        CleanupOrder::First => pool.pre_cleanup_register(cleanup)?,
        CleanupOrder::Last => pool.cleanup_register(cleanup)?,
    };
    Ok(id)
}

/// A bounded, thread-safe list of reusable resources.
///
/// Dropping the list destroys it. A list attached to a pool with
/// [`with_pool`](Self::with_pool) is also destroyed when that pool is
/// cleared or destroyed.
pub struct ResList<R: Resource> {
    shared: Arc<Shared<R>>,
}

impl<R: Resource> ResList<R> {
    /// Creates a free-standing list and builds `min` instances up front.
    pub fn new(config: ResListConfig, resource: R) -> Result<Self> {
        Self::build(config, resource, None)
    }

    /// Creates a list whose teardown is tied to `pool`.
    pub fn with_pool(config: ResListConfig, resource: R, pool: &PoolRef) -> Result<Self> {
        Self::build(config, resource, Some(pool))
    }

    fn build(config: ResListConfig, resource: R, pool: Option<&PoolRef>) -> Result<Self> {
        config.validate()?;
        let config = config.effective();
        debug!(
            min = config.min,
            smax = config.smax,
            hmax = config.hmax,
            ttl = ?config.ttl,
            "creating resource list"
        );

        let shared = Arc::new(Shared {
            resource,
            state: Mutex::new(State {
                config,
                ntotal: 0,
                idle: Ring::new(),
                destroyed: false,
            }),
            available: Condvar::new(),
            pool: pool.map(PoolRef::downgrade),
            registration: Mutex::new(None),
        });

        let filled = {
            let mut state = shared.state.lock();
            shared.maintain_locked(&mut state)
        };
        if let Err(error) = filled {
            if let Err(unwind) = shared.teardown() {
                warn!(%unwind, "unwinding partially built resource list failed");
            }
            return Err(error);
        }

        if let Some(pool) = pool {
            match register_cleanup(&shared, pool, CleanupOrder::Last) {
                Ok(id) => *shared.registration.lock() = Some(id),
                Err(error) => {
                    if let Err(unwind) = shared.teardown() {
                        warn!(%unwind, "unwinding unregistered resource list failed");
                    }
                    return Err(error);
                }
            }
        }
        Ok(Self { shared })
    }

    /// Acquires the most recently released instance, or builds one.
    pub fn acquire(&self) -> Result<Lease<R>> {
        self.acquire_ex(AcquireOrder::Lifo)
    }

    /// Acquires an instance in the given order.
    ///
    /// Blocks while `hmax` instances are checked out, up to the configured
    /// timeout.
    pub fn acquire_ex(&self, order: AcquireOrder) -> Result<Lease<R>> {
        let instance = self.shared.acquire(order)?;
        Ok(Lease::new(instance, Arc::clone(&self.shared)))
    }

    /// Returns an instance taken out with [`Lease::into_inner`].
    pub fn release(&self, instance: R::Instance) -> Result<()> {
        self.shared.release(instance)
    }

    /// Destroys an instance taken out with [`Lease::into_inner`].
    pub fn invalidate(&self, instance: R::Instance) -> Result<()> {
        self.shared.invalidate(instance)
    }

    /// Builds missing instances up to `min`, or expires stale ones.
    pub fn maintain(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed);
        }
        self.shared.maintain_locked(&mut state)
    }

    /// Instances currently checked out
    pub fn acquired_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.ntotal.saturating_sub(state.idle.len())
    }

    /// Instances waiting in the idle set
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle.len()
    }

    /// Instances in existence
    pub fn total_count(&self) -> usize {
        self.shared.state.lock().ntotal
    }

    /// Bounds in effect, including any coercion applied by this build
    pub fn config(&self) -> ResListConfig {
        self.shared.state.lock().config.clone()
    }

    /// Changes how long later `acquire` calls may block; `None` or zero
    /// waits indefinitely.
    pub fn timeout_set(&self, timeout: Option<Duration>) {
        self.shared.state.lock().config.timeout = timeout.filter(|t| !t.is_zero());
    }

    /// Moves the pool cleanup before or after the pool's children.
    ///
    /// No-op for a list without a pool or whose pool is gone.
    pub fn cleanup_order_set(&self, order: CleanupOrder) -> Result<()> {
        let Some(pool) = self.shared.pool.as_ref().and_then(WeakPool::upgrade) else {
            return Ok(());
        };
        let mut registration = self.shared.registration.lock();
        if let Some(id) = registration.take() {
            pool.cleanup_kill(id)?;
        }
        *registration = Some(register_cleanup(&self.shared, &pool, order)?);
        Ok(())
    }

    /// Destroys every idle instance and unhooks the list from its pool.
    ///
    /// Fails with [`Error::Outstanding`] when instances are still checked
    /// out; those are destroyed as they come back.
    pub fn destroy(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        let registration = self.shared.registration.lock().take();
        let pool = self.shared.pool.as_ref().and_then(WeakPool::upgrade);
        if let (Some(pool), Some(id)) = (pool, registration)
            && let Err(error) = pool.cleanup_kill(id)
        {
            // the pool already ran (or is running) the teardown
            trace!(%error, "resource list cleanup already gone");
        }
        self.shared.teardown()
    }
}

impl<R: Resource> Drop for ResList<R> {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            debug!(%error, "resource list dropped");
        }
    }
}

impl<R: Resource> fmt::Debug for ResList<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ResList")
            .field("config", &state.config)
            .field("ntotal", &state.ntotal)
            .field("nidle", &state.idle.len())
            .field("destroyed", &state.destroyed)
            .finish_non_exhaustive()
    }
}
