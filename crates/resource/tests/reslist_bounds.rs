//! Resource list bounds, expiry, ordering and blocking behaviour.

#![cfg(feature = "threads")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regio_memory::pool::Pool;
use regio_resource::{
    AcquireOrder, BoxError, Error, FnResource, ResList, ResListConfig, Resource,
};

// ---------------------------------------------------------------------------
// Test resource
// ---------------------------------------------------------------------------

/// Hands out increasing ids and records what it built and destroyed.
#[derive(Default)]
struct Tracked {
    next: AtomicUsize,
    created: AtomicUsize,
    destroyed: Mutex<Vec<usize>>,
    /// Constructor calls (1-based) that should fail
    fail_on: Mutex<Vec<usize>>,
}

impl Tracked {
    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn destroyed(&self) -> Vec<usize> {
        self.destroyed.lock().clone()
    }
}

#[derive(Clone, Default)]
struct TrackedResource(Arc<Tracked>);

impl Resource for TrackedResource {
    type Instance = usize;

    fn create(&self) -> Result<usize, BoxError> {
        let call = self.0.next.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.fail_on.lock().contains(&call) {
            return Err(format!("constructor call {call} refused").into());
        }
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(call)
    }

    fn destroy(&self, instance: usize) -> Result<(), BoxError> {
        self.0.destroyed.lock().push(instance);
        Ok(())
    }
}

/// Routes list events to the test harness output; repeat calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn tracked() -> (Arc<Tracked>, TrackedResource) {
    let resource = TrackedResource::default();
    (Arc::clone(&resource.0), resource)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn create_prebuilds_min_idle() {
    let (stats, resource) = tracked();
    let list = ResList::new(ResListConfig::new(2, 4, 4), resource).unwrap();

    assert_eq!(stats.created(), 2);
    assert_eq!(list.idle_count(), 2);
    assert_eq!(list.total_count(), 2);
    assert_eq!(list.acquired_count(), 0);
}

#[test]
fn create_rejects_inconsistent_bounds() {
    for (min, smax, hmax) in [(3, 2, 4), (0, 5, 4), (0, 0, 0)] {
        let (stats, resource) = tracked();
        let err = ResList::new(ResListConfig::new(min, smax, hmax), resource).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{min}/{smax}/{hmax}");
        assert_eq!(stats.created(), 0);
    }
}

#[test]
fn create_failure_destroys_what_was_built() {
    let (stats, resource) = tracked();
    stats.fail_on.lock().push(3);

    let err = ResList::new(ResListConfig::new(3, 3, 3), resource).unwrap_err();

    assert!(matches!(err, Error::Constructor { .. }));
    let mut destroyed = stats.destroyed();
    destroyed.sort_unstable();
    assert_eq!(destroyed, [1, 2]);
}

// ---------------------------------------------------------------------------
// Hard maximum and timeouts
// ---------------------------------------------------------------------------

#[test]
fn exhausted_acquire_times_out() {
    let (stats, resource) = tracked();
    let config = ResListConfig::new(0, 2, 2).with_timeout(Duration::from_millis(100));
    let list = ResList::new(config, resource).unwrap();

    let _a = list.acquire().unwrap();
    let _b = list.acquire().unwrap();
    let start = Instant::now();
    let err = list.acquire().unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(list.acquired_count(), 2);
    assert_eq!(stats.created(), 2);
}

#[test]
fn release_unblocks_waiter() {
    let (_, resource) = tracked();
    let list = Arc::new(ResList::new(ResListConfig::new(0, 1, 1), resource).unwrap());
    let held = list.acquire().unwrap();
    let id = *held;

    let waiter = {
        let list = Arc::clone(&list);
        thread::spawn(move || list.acquire().map(|lease| *lease))
    };
    thread::sleep(Duration::from_millis(50));
    drop(held);

    assert_eq!(waiter.join().unwrap().unwrap(), id);
}

#[test]
fn invalidate_unblocks_waiter_with_fresh_instance() {
    let (stats, resource) = tracked();
    let list = Arc::new(ResList::new(ResListConfig::new(0, 1, 1), resource).unwrap());
    let held = list.acquire().unwrap();

    let waiter = {
        let list = Arc::clone(&list);
        thread::spawn(move || list.acquire().map(|lease| *lease))
    };
    thread::sleep(Duration::from_millis(50));
    held.invalidate().unwrap();

    assert_eq!(waiter.join().unwrap().unwrap(), 2);
    assert_eq!(stats.destroyed(), [1]);
    assert_eq!(stats.created(), 2);
}

#[test]
fn constructor_failure_does_not_consume_slot() {
    let (stats, resource) = tracked();
    stats.fail_on.lock().push(1);
    let list = ResList::new(ResListConfig::new(0, 1, 1), resource).unwrap();

    assert!(matches!(list.acquire(), Err(Error::Constructor { .. })));
    assert_eq!(list.total_count(), 0);

    let lease = list.acquire().unwrap();
    assert_eq!(*lease, 2);
    assert_eq!(list.total_count(), 1);
}

#[test]
fn contended_list_never_exceeds_hmax() {
    const HMAX: usize = 3;
    init_tracing();
    let (stats, resource) = tracked();
    let list = Arc::new(ResList::new(ResListConfig::new(0, 1, HMAX), resource).unwrap());
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let list = Arc::clone(&list);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..50 {
                    let lease = list.acquire().unwrap();
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    in_use.fetch_sub(1, Ordering::SeqCst);
                    drop(lease);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= HMAX);
    assert!(stats.created() <= HMAX);
    assert!(list.total_count() <= HMAX);
    assert_eq!(list.acquired_count(), 0);
}

// ---------------------------------------------------------------------------
// TTL expiry
// ---------------------------------------------------------------------------

#[test]
fn expired_surplus_is_destroyed_down_to_smax() {
    let (stats, resource) = tracked();
    let config = ResListConfig::new(0, 1, 3).with_ttl(Duration::from_millis(50));
    let list = ResList::new(config, resource).unwrap();

    let a = list.acquire().unwrap().into_inner();
    let b = list.acquire().unwrap().into_inner();
    list.release(a).unwrap();
    list.release(b).unwrap();
    assert_eq!(list.idle_count(), 2);

    thread::sleep(Duration::from_millis(80));
    list.maintain().unwrap();

    // the oldest idle instance goes first
    assert_eq!(stats.destroyed(), [a]);
    assert_eq!(list.idle_count(), 1);
    assert_eq!(list.total_count(), 1);
}

#[test]
fn expiry_keeps_smax_idle() {
    let (stats, resource) = tracked();
    let config = ResListConfig::new(0, 2, 2).with_ttl(Duration::from_millis(30));
    let list = ResList::new(config, resource).unwrap();

    let a = list.acquire().unwrap().into_inner();
    let b = list.acquire().unwrap().into_inner();
    list.release(a).unwrap();
    list.release(b).unwrap();

    thread::sleep(Duration::from_millis(60));
    list.maintain().unwrap();

    assert!(stats.destroyed().is_empty());
    assert_eq!(list.idle_count(), 2);
}

#[test]
fn fresh_idle_is_not_expired() {
    let (stats, resource) = tracked();
    let config = ResListConfig::new(0, 0, 2).with_ttl(Duration::from_secs(60));
    let list = ResList::new(config, resource).unwrap();

    drop(list.acquire().unwrap());
    list.maintain().unwrap();

    assert!(stats.destroyed().is_empty());
    assert_eq!(list.idle_count(), 1);
}

#[test]
fn acquire_expires_before_handing_out() {
    let (stats, resource) = tracked();
    let config = ResListConfig::new(0, 0, 2).with_ttl(Duration::from_millis(30));
    let list = ResList::new(config, resource).unwrap();

    let first = list.acquire().unwrap().into_inner();
    list.release(first).unwrap();
    thread::sleep(Duration::from_millis(60));

    let lease = list.acquire().unwrap();
    assert_eq!(*lease, 2);
    assert_eq!(stats.destroyed(), [first]);
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn fifo_takes_oldest_lifo_takes_newest() {
    let (_, resource) = tracked();
    let list = ResList::new(ResListConfig::new(0, 3, 3), resource).unwrap();

    let r1 = list.acquire().unwrap().into_inner();
    let r2 = list.acquire().unwrap().into_inner();
    let r3 = list.acquire().unwrap().into_inner();
    list.release(r1).unwrap();
    list.release(r2).unwrap();
    list.release(r3).unwrap();

    let oldest = list.acquire_ex(AcquireOrder::Fifo).unwrap();
    assert_eq!(*oldest, r1);
    let newest = list.acquire_ex(AcquireOrder::Lifo).unwrap();
    assert_eq!(*newest, r3);
}

// ---------------------------------------------------------------------------
// Destruction
// ---------------------------------------------------------------------------

#[test]
fn pool_destroy_destroys_idle_resources() {
    let (stats, resource) = tracked();
    let pool = Pool::new().unwrap();
    let list = ResList::with_pool(ResListConfig::new(2, 3, 3), resource, &pool).unwrap();

    pool.destroy();

    let mut destroyed = stats.destroyed();
    destroyed.sort_unstable();
    assert_eq!(destroyed, [1, 2]);
    assert!(matches!(list.acquire(), Err(Error::Destroyed)));
    assert_eq!(list.total_count(), 0);
}

#[test]
fn child_pool_destroy_tears_down_its_list() {
    let (stats, resource) = tracked();
    let root = Pool::new().unwrap();
    let child = root.create_child().unwrap();
    let list = ResList::with_pool(ResListConfig::new(1, 1, 1), resource, &child).unwrap();

    root.clear();

    assert_eq!(stats.destroyed(), [1]);
    assert!(matches!(list.maintain(), Err(Error::Destroyed)));
}

#[test]
fn destroy_reports_outstanding_and_disposes_late_returns() {
    init_tracing();
    let (stats, resource) = tracked();
    let list = ResList::new(ResListConfig::new(1, 2, 2), resource).unwrap();
    let lease = list.acquire().unwrap();
    let id = *lease;

    // the lease keeps the shared state alive past the handle
    let err = list.destroy().unwrap_err();
    assert!(matches!(err, Error::Outstanding { count: 1 }));

    drop(lease);
    assert_eq!(stats.destroyed(), [id]);
}

#[test]
fn destroy_with_nothing_outstanding_succeeds() {
    let (stats, resource) = tracked();
    let list = ResList::new(ResListConfig::new(2, 2, 2), resource).unwrap();
    list.destroy().unwrap();
    assert_eq!(stats.destroyed().len(), 2);
}

#[test]
fn destructor_failure_is_reported() {
    let resource = FnResource::new(
        || Ok(0_u32),
        |_v: u32| Err(BoxError::from("socket already closed")),
    );
    let list = ResList::new(ResListConfig::new(1, 1, 1), resource).unwrap();
    let err = list.destroy().unwrap_err();
    assert!(matches!(err, Error::Destructor { .. }));
    assert!(err.to_string().contains("socket already closed"));
}
