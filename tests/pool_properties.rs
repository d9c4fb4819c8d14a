mod common;

use common::{init_tracing, CountingAllocator};
use esox_slotpool::{
    ExpirationPolicy, LifecycleState, Pool, PoolConfiguration, PoolError, QueueOrdering, SlotInfo,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const LONG: Duration = Duration::from_secs(10);

fn pool_of(size: usize) -> (Pool<CountingAllocator>, CountingAllocator) {
    init_tracing();
    let allocator = CountingAllocator::new();
    let pool = Pool::new(PoolConfiguration::new(allocator.clone()).with_size(size)).unwrap();
    (pool, allocator)
}

#[test]
fn no_object_is_claimed_twice_at_once() {
    let (pool, _allocator) = pool_of(3);
    let overlaps = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for _ in 0..500 {
                    let obj = pool.claim(LONG).unwrap();
                    if !obj.enter() {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    obj.leave();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn live_slots_never_exceed_target() {
    let (pool, allocator) = pool_of(4);
    let stop = Arc::new(AtomicBool::new(false));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let sampler = {
        let pool = pool.clone();
        let stop = Arc::clone(&stop);
        let max_seen = Arc::clone(&max_seen);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                max_seen.fetch_max(pool.live_slots(), Ordering::SeqCst);
                thread::yield_now();
            }
        })
    };

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                for _ in 0..300 {
                    drop(pool.claim(LONG).unwrap());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::SeqCst);
    sampler.join().unwrap();

    assert!(max_seen.load(Ordering::SeqCst) <= 4);
    assert!(allocator.allocations() <= 4);
}

#[test]
fn shrinking_converges_to_new_target() {
    let (pool, allocator) = pool_of(6);
    let held: Vec<_> = (0..6).map(|_| pool.claim(LONG).unwrap()).collect();
    assert_eq!(pool.live_slots(), 6);

    pool.set_target_size(2).unwrap();
    // Still claimed, so the count drains as they come back
    assert_eq!(pool.live_slots(), 6);

    drop(held);
    assert_eq!(pool.live_slots(), 2);
    assert_eq!(allocator.deallocations(), 4);

    let a = pool.claim(LONG).unwrap();
    let b = pool.claim(LONG).unwrap();
    assert!(matches!(pool.try_claim(), Err(PoolError::Timeout(_))));
    drop((a, b));
    assert_eq!(allocator.allocations(), 6);
}

#[test]
fn timed_out_claim_honors_budget() {
    let (pool, _allocator) = pool_of(1);
    let _held = pool.claim(LONG).unwrap();

    let budget = Duration::from_millis(100);
    let start = Instant::now();
    let err = pool.claim(budget).unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, PoolError::Timeout(d) if d == budget));
    assert!(elapsed >= budget, "returned early after {:?}", elapsed);
    assert!(elapsed < budget + Duration::from_secs(1), "returned late after {:?}", elapsed);

    // Nothing was left behind by the failed claim
    assert_eq!(pool.live_slots(), 1);
    assert_eq!(pool.claimed_count(), 1);
    assert_eq!(pool.available_count(), 0);
}

#[test]
fn shutdown_destroys_every_object_exactly_once() {
    let (pool, allocator) = pool_of(4);
    let barrier = Arc::new(Barrier::new(3));

    // Two callers keep their objects across the shutdown
    let holders: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let obj = pool.claim(LONG).unwrap();
                barrier.wait();
                barrier.wait();
                obj.release();
            })
        })
        .collect();

    barrier.wait();
    pool.warmup(4).unwrap();
    assert_eq!(pool.live_slots(), 4);

    let completion = pool.shutdown();
    assert_eq!(pool.lifecycle_state(), LifecycleState::ShuttingDown);
    assert_eq!(allocator.deallocations(), 2);
    assert!(!completion.wait(Duration::from_millis(20)));

    barrier.wait();
    for holder in holders {
        holder.join().unwrap();
    }

    completion.wait_forever();
    assert!(completion.is_done());
    assert_eq!(pool.live_slots(), 0);
    assert_eq!(pool.lifecycle_state(), LifecycleState::ShutDown);
    assert_eq!(allocator.allocations(), 4);
    assert!(allocator.all_deallocated_once());
}

#[test]
fn shutdown_is_idempotent() {
    let (pool, allocator) = pool_of(2);
    pool.warmup(2).unwrap();

    let first = pool.shutdown();
    let second = pool.shutdown();
    assert!(first.same_as(&second));
    assert!(second.wait(LONG));
    assert_eq!(allocator.deallocations(), 2);
}

#[test]
fn expired_objects_are_replaced() {
    init_tracing();
    let allocator = CountingAllocator::new();
    let n = 5;
    let config = PoolConfiguration::new(allocator.clone())
        .with_size(1)
        .with_expiration(ExpirationPolicy::MaxClaims(n));
    let pool = Pool::new(config).unwrap();

    for _ in 0..2 * n {
        pool.claim(LONG).unwrap().release();
    }

    assert_eq!(allocator.allocations(), 2);
    assert_eq!(allocator.deallocations(), 1);
    assert_eq!(pool.metrics().expirations, 1);
}

#[test]
fn replacement_of_expired_object_stops_at_the_deadline() {
    init_tracing();
    let allocator = CountingAllocator::new();
    let config = PoolConfiguration::new(allocator.clone()).with_expiration(|_: &SlotInfo| true);
    let pool = Pool::new(config).unwrap();

    // One replacement is attempted, then the slot goes back to the queue
    let err = pool.claim(Duration::ZERO).unwrap_err();
    assert!(matches!(err, PoolError::Timeout(d) if d == Duration::ZERO));
    assert_eq!(allocator.allocations(), 2);
    assert_eq!(allocator.deallocations(), 1);
    assert_eq!(pool.live_slots(), 1);
    assert_eq!(pool.available_count(), 1);

    assert!(pool.shutdown().wait(LONG));
    assert_eq!(pool.live_slots(), 0);
    assert!(allocator.all_deallocated_once());
}

#[test]
fn shutdown_under_load_destroys_every_object_once() {
    for _ in 0..20 {
        init_tracing();
        let allocator = CountingAllocator::new();
        let config = PoolConfiguration::new(allocator.clone())
            .with_size(4)
            .with_expiration(ExpirationPolicy::MaxClaims(7));
        let pool = Pool::new(config).unwrap();

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || loop {
                    match pool.claim(LONG) {
                        Ok(obj) => {
                            assert!(obj.enter());
                            obj.leave();
                        }
                        Err(PoolError::PoolShutDown) => break,
                        Err(e) => panic!("unexpected claim error: {}", e),
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        let completion = pool.shutdown();
        assert!(completion.wait(LONG));

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(pool.live_slots(), 0);
        assert_eq!(pool.available_count(), 0);
        assert_eq!(pool.lifecycle_state(), LifecycleState::ShutDown);
        assert!(allocator.all_deallocated_once());
    }
}

#[test]
fn released_object_wakes_the_next_claimant() {
    let (pool, _allocator) = pool_of(1);

    let a = pool.claim(LONG).unwrap();
    let b_first = {
        let pool = pool.clone();
        thread::spawn(move || pool.claim(Duration::ZERO).map(|o| o.serial))
    }
    .join()
    .unwrap();
    assert!(matches!(b_first, Err(PoolError::Timeout(_))));

    let serial = a.serial;
    let b = {
        let pool = pool.clone();
        thread::spawn(move || pool.claim(LONG).map(|o| o.serial))
    };
    thread::sleep(Duration::from_millis(20));
    a.release();

    assert_eq!(b.join().unwrap().unwrap(), serial);
}

#[test]
fn sixteen_threads_share_four_slots() {
    let (pool, allocator) = pool_of(4);
    assert_eq!(pool.warmup(4).unwrap(), 4);
    let workers: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let obj = pool.claim(LONG).unwrap();
                    assert!(obj.enter());
                    obj.leave();
                    drop(obj);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(pool.live_slots(), 4);
    assert_eq!(pool.claimed_count(), 0);
    assert_eq!(pool.available_count(), 4);
    assert_eq!(allocator.allocations(), 4);

    let metrics = pool.metrics();
    assert_eq!(metrics.claims, 16_000);
    assert_eq!(metrics.releases, 16_000);
}

#[test]
fn failed_deallocation_does_not_stall_shutdown() {
    let (pool, allocator) = pool_of(3);
    pool.warmup(3).unwrap();
    allocator.fail_deallocations(true);

    assert!(pool.shutdown().wait(LONG));
    assert_eq!(pool.live_slots(), 0);
    assert!(allocator.all_deallocated_once());

    let failures = pool.take_deallocation_failures();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|e| matches!(e, PoolError::DeallocationFailed(_))));
    assert!(pool.take_deallocation_failures().is_empty());
}

#[test]
fn allocation_failure_reaches_the_caller_and_queues_nothing() {
    let (pool, allocator) = pool_of(2);
    allocator.fail_allocations(true);

    let err = pool.claim(LONG).unwrap_err();
    assert!(matches!(err, PoolError::AllocationFailed(_)));
    assert_eq!(pool.live_slots(), 0);
    assert_eq!(pool.available_count(), 0);

    allocator.fail_allocations(false);
    assert!(pool.claim(LONG).is_ok());
}

#[test]
fn failed_replacement_frees_the_slot() {
    init_tracing();
    let allocator = CountingAllocator::new();
    let config = PoolConfiguration::new(allocator.clone()).with_expiration(ExpirationPolicy::MaxClaims(1));
    let pool = Pool::new(config).unwrap();

    pool.claim(LONG).unwrap().release();
    allocator.fail_allocations(true);
    assert!(matches!(pool.claim(LONG), Err(PoolError::AllocationFailed(_))));
    assert_eq!(pool.live_slots(), 0);
    assert_eq!(allocator.deallocations(), 1);

    allocator.fail_allocations(false);
    assert!(pool.claim(LONG).is_ok());
}

#[test]
fn slow_allocation_is_handed_out_not_orphaned() {
    init_tracing();
    let allocator = CountingAllocator::with_cost(Duration::from_millis(50));
    let pool = Pool::new(PoolConfiguration::new(allocator.clone())).unwrap();

    // The allocation outlives the budget, but the object is still delivered
    let obj = pool.claim(Duration::from_millis(1)).unwrap();
    assert_eq!(pool.live_slots(), 1);
    obj.release();
    assert_eq!(pool.available_count(), 1);
}

#[test]
fn queue_ordering_is_deterministic() {
    for (ordering, expected) in [(QueueOrdering::Fifo, 0), (QueueOrdering::Lifo, 2)] {
        init_tracing();
        let allocator = CountingAllocator::new();
        let config = PoolConfiguration::new(allocator).with_size(3).with_ordering(ordering);
        let pool = Pool::new(config).unwrap();

        let claims: Vec<_> = (0..3).map(|_| pool.claim(LONG).unwrap()).collect();
        // Released in serial order 0, 1, 2
        for claim in claims {
            claim.release();
        }

        let next = pool.claim(LONG).unwrap();
        assert_eq!(next.serial, expected, "{:?}", ordering);
    }
}

#[test]
fn claims_blocked_during_shutdown_fail_fast() {
    let (pool, _allocator) = pool_of(1);
    let held = pool.claim(LONG).unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let result = pool.claim(LONG).map(|_| ());
                (result, start.elapsed())
            })
        })
        .collect();
    thread::sleep(Duration::from_millis(20));

    let completion = pool.shutdown();
    for waiter in waiters {
        let (result, elapsed) = waiter.join().unwrap();
        assert!(matches!(result, Err(PoolError::PoolShutDown)));
        assert!(elapsed < LONG);
    }

    drop(held);
    assert!(completion.wait(LONG));
}
