//! Property tests for resource list counters.
//!
//! After any sequence of acquire, release, invalidate and maintain calls,
//! `idle <= total <= hmax` holds and every built instance is either alive in
//! the list, checked out, or destroyed exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use regio_resource::{
    AcquireOrder, Error, FnResource, Lease, ResList, ResListConfig, Resource,
};

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire(AcquireOrder),
    Release,
    Invalidate,
    Maintain,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Acquire(AcquireOrder::Lifo)),
        Just(Op::Acquire(AcquireOrder::Fifo)),
        Just(Op::Release),
        Just(Op::Invalidate),
        Just(Op::Maintain),
    ]
}

fn bounds() -> impl Strategy<Value = (usize, usize, usize)> {
    (1usize..6)
        .prop_flat_map(|hmax| (0..=hmax, Just(hmax)))
        .prop_flat_map(|(smax, hmax)| (0..=smax, Just(smax), Just(hmax)))
}

struct Counters {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

fn counting(counters: &Arc<Counters>) -> impl Resource<Instance = ()> + use<> {
    let made = Arc::clone(counters);
    let gone = Arc::clone(counters);
    FnResource::new(
        move || {
            made.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        move |()| {
            gone.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn counters_stay_within_bounds(
        (min, smax, hmax) in bounds(),
        ops in proptest::collection::vec(op(), 1..40),
    ) {
        let counters = Arc::new(Counters {
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        });
        let config = ResListConfig::new(min, smax, hmax)
            .with_timeout(Duration::from_millis(1));
        let list = ResList::new(config, counting(&counters)).unwrap();
        let mut held: Vec<Lease<_>> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire(order) => match list.acquire_ex(order) {
                    Ok(lease) => held.push(lease),
                    Err(Error::Timeout { .. } | Error::WouldBlock) => {
                        prop_assert_eq!(held.len(), list.config().hmax);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                },
                Op::Release => {
                    if let Some(lease) = held.pop() {
                        lease.release().unwrap();
                    }
                }
                Op::Invalidate => {
                    if let Some(lease) = held.pop() {
                        lease.invalidate().unwrap();
                    }
                }
                Op::Maintain => list.maintain().unwrap(),
            }

            let total = list.total_count();
            let idle = list.idle_count();
            prop_assert!(idle <= total);
            prop_assert!(total <= hmax);
            prop_assert_eq!(list.acquired_count(), held.len());
            prop_assert_eq!(
                counters.created.load(Ordering::SeqCst)
                    - counters.destroyed.load(Ordering::SeqCst),
                total
            );
        }

        drop(held);
        list.destroy().unwrap();
        prop_assert_eq!(
            counters.created.load(Ordering::SeqCst),
            counters.destroyed.load(Ordering::SeqCst)
        );
    }
}
