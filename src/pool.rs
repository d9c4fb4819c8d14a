//! The slot pool: claim, release, expiration, resizing and shutdown

use crate::allocator::Allocator;
use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::expiration::Expiration;
use crate::health::HealthStatus;
use crate::metrics::{Gauges, MetricsExporter, MetricsTracker, PoolMetrics};
use crate::queue::{AvailabilityQueue, QueueOrdering};
use crate::shutdown::{Completion, LifecycleState, ShutdownController};
use crate::slot::{Slot, SlotContext, SlotId, SlotInfo};

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// An object claimed from a [`Pool`].
///
/// Dereferences to the pooled object. Dropping the handle releases the
/// object back to the pool, as does [`release`](Claimed::release). The
/// handle only holds a weak link to its pool, so outstanding claims never
/// keep a dropped pool alive.
pub struct Claimed<A: Allocator> {
    slot: Option<Slot<A::Object>>,
    pool: Weak<Shared<A>>,
}

impl<A: Allocator> Claimed<A> {
    /// Return the object to the pool
    pub fn release(self) {
        drop(self);
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot().id()
    }

    /// Metadata of the slot, as the expiration saw it plus this claim
    pub fn slot_info(&self) -> SlotInfo {
        self.slot().info()
    }

    /// Take the object out of the pool for good. The slot is retired without
    /// calling the allocator's deallocate hook and the pool may allocate a
    /// replacement on a later claim.
    pub fn into_inner(mut self) -> A::Object {
        let mut slot = self.slot.take().expect("claimed slot already taken");
        let object = slot.kill().expect("claimed slot holds no object");
        if let Some(shared) = self.pool.upgrade() {
            shared.unregister(slot.id());
            shared.retire();
        }
        object
    }

    /// Whether this claim was handed out by `pool`
    pub fn belongs_to(&self, pool: &Pool<A>) -> bool {
        std::ptr::eq(self.pool.as_ptr(), Arc::as_ptr(&pool.shared))
    }

    fn slot(&self) -> &Slot<A::Object> {
        self.slot.as_ref().expect("claimed slot already taken")
    }
}

impl<A: Allocator> Deref for Claimed<A> {
    type Target = A::Object;

    fn deref(&self) -> &Self::Target {
        self.slot().object().expect("claimed slot holds no object")
    }
}

impl<A: Allocator> DerefMut for Claimed<A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slot
            .as_mut()
            .and_then(Slot::object_mut)
            .expect("claimed slot holds no object")
    }
}

impl<A: Allocator> Drop for Claimed<A> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(shared) => shared.release_slot(slot),
            None => {
                tracing::warn!(slot = %slot.id(), "pool was dropped before the claim was released");
            }
        }
    }
}

impl<A: Allocator> fmt::Debug for Claimed<A>
where
    A::Object: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claimed")
            .field("slot", &self.slot.as_ref().map(Slot::id))
            .field("state", &self.slot.as_ref().map(Slot::state))
            .field("object", &self.slot.as_ref().and_then(Slot::object))
            .finish()
    }
}

/// State shared between pool handles and, weakly, claim handles
struct Shared<A: Allocator> {
    allocator: A,
    expiration: Box<dyn Expiration>,
    queue: AvailabilityQueue<Slot<A::Object>>,
    claimed: DashMap<SlotId, ()>,
    target: AtomicUsize,
    next_id: AtomicUsize,
    lifecycle: Arc<ShutdownController>,
    metrics: MetricsTracker,
    failures: SegQueue<PoolError>,
    claim_timeout: Option<Duration>,
}

impl<A: Allocator> Shared<A> {
    fn target(&self) -> usize {
        self.target.load(Ordering::SeqCst)
    }

    fn is_over_target(&self) -> bool {
        self.lifecycle.live() > self.target()
    }

    fn claim(self: &Arc<Self>, deadline: Option<Instant>, budget: Duration) -> PoolResult<Claimed<A>> {
        loop {
            // Read the epoch before anything that can make us wait, so
            // capacity freed or a shutdown started after this point wakes us
            let epoch = self.queue.epoch();
            if !self.lifecycle.is_running() {
                return Err(PoolError::PoolShutDown);
            }

            let slot = match self.queue.try_poll() {
                Some(slot) => slot,
                None => match self.allocate_slot()? {
                    Some(slot) => slot,
                    None => match self.queue.poll(deadline, epoch) {
                        Some(slot) => slot,
                        None => {
                            if !self.lifecycle.is_running() {
                                return Err(PoolError::PoolShutDown);
                            }
                            if deadline.is_some_and(|d| Instant::now() >= d) {
                                MetricsTracker::record(&self.metrics.timeouts);
                                return Err(PoolError::Timeout(budget));
                            }
                            continue;
                        }
                    },
                },
            };

            if let Some(claimed) = self.prepare(slot, deadline, budget)? {
                return Ok(claimed);
            }
        }
    }

    /// Validate a slot taken from the queue or freshly allocated, replacing
    /// its object while it is expired. Returns `None` when the slot was
    /// destroyed because the pool is above its target size.
    fn prepare(
        self: &Arc<Self>,
        mut slot: Slot<A::Object>,
        deadline: Option<Instant>,
        budget: Duration,
    ) -> PoolResult<Option<Claimed<A>>> {
        let mut replaced = false;
        loop {
            if self.is_over_target() {
                tracing::debug!(slot = %slot.id(), target = self.target(), "destroying slot above target size");
                self.destroy(slot);
                return Ok(None);
            }

            if !self.expiration.has_expired(&slot.info()) {
                break;
            }

            if replaced && deadline.is_some_and(|d| Instant::now() >= d) {
                // Out of budget; the next claimant gets to replace it
                self.make_available(slot);
                MetricsTracker::record(&self.metrics.timeouts);
                return Err(PoolError::Timeout(budget));
            }

            self.reallocate(&mut slot)?;
            replaced = true;
        }

        slot.mark_claimed();
        self.claimed.insert(slot.id(), ());
        MetricsTracker::record(&self.metrics.claims);

        Ok(Some(Claimed {
            slot: Some(slot),
            pool: Arc::downgrade(self),
        }))
    }

    /// Destroy the expired object and allocate a new one in the same slot.
    /// On failure the slot is gone and its capacity is free again.
    fn reallocate(&self, slot: &mut Slot<A::Object>) -> PoolResult<()> {
        let id = slot.id();
        MetricsTracker::record(&self.metrics.expirations);
        slot.mark_expired();
        if let Some(object) = slot.kill() {
            self.deallocate(id, object);
        }

        if !self.lifecycle.is_running() {
            self.retire();
            return Err(PoolError::PoolShutDown);
        }

        match self.allocator.allocate(&SlotContext { slot: id, reallocation: true }) {
            Ok(object) => {
                MetricsTracker::record(&self.metrics.allocations);
                tracing::debug!(slot = %id, "reallocated expired object");
                slot.revive(object);
                Ok(())
            }
            Err(err) => {
                MetricsTracker::record(&self.metrics.failed_allocations);
                tracing::warn!(slot = %id, error = %err, "reallocation failed, slot dropped");
                self.retire();
                Err(PoolError::allocation(err))
            }
        }
    }

    /// Allocate a new slot if the pool is below its target size
    fn allocate_slot(&self) -> PoolResult<Option<Slot<A::Object>>> {
        if !self.lifecycle.try_reserve(self.target()) {
            return Ok(None);
        }
        if !self.lifecycle.is_running() {
            self.retire();
            return Err(PoolError::PoolShutDown);
        }

        let id = SlotId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.allocator.allocate(&SlotContext { slot: id, reallocation: false }) {
            Ok(object) => {
                MetricsTracker::record(&self.metrics.allocations);
                tracing::debug!(slot = %id, live = self.lifecycle.live(), "allocated object");

                if !self.lifecycle.is_running() {
                    self.deallocate(id, object);
                    self.retire();
                    return Err(PoolError::PoolShutDown);
                }
                Ok(Some(Slot::new(id, object)))
            }
            Err(err) => {
                MetricsTracker::record(&self.metrics.failed_allocations);
                tracing::warn!(slot = %id, error = %err, "allocation failed");
                self.retire();
                Err(PoolError::allocation(err))
            }
        }
    }

    fn release_slot(&self, mut slot: Slot<A::Object>) {
        if self.claimed.remove(&slot.id()).is_none() {
            panic!("{} released but it is not claimed from this pool", slot.id());
        }
        MetricsTracker::record(&self.metrics.releases);
        slot.mark_living();

        if !self.lifecycle.is_running() {
            self.destroy(slot);
        } else if self.is_over_target() {
            tracing::debug!(slot = %slot.id(), target = self.target(), "destroying released slot above target size");
            self.destroy(slot);
        } else {
            self.make_available(slot);
        }
    }

    fn unregister(&self, id: SlotId) {
        self.claimed.remove(&id);
    }

    /// Queue a living slot. If shutdown began concurrently the queue is
    /// drained again, so the slot cannot be stranded there.
    fn make_available(&self, slot: Slot<A::Object>) {
        self.queue.offer(slot);
        if !self.lifecycle.is_running() {
            self.drain_available();
        }
    }

    fn drain_available(&self) -> usize {
        let drained = self.queue.drain();
        let count = drained.len();
        for slot in drained {
            self.destroy(slot);
        }
        count
    }

    /// Destroy a slot's object and give back its capacity
    fn destroy(&self, mut slot: Slot<A::Object>) {
        let id = slot.id();
        if let Some(object) = slot.kill() {
            self.deallocate(id, object);
        }
        self.retire();
    }

    fn deallocate(&self, id: SlotId, object: A::Object) {
        MetricsTracker::record(&self.metrics.deallocations);
        match self.allocator.deallocate(object) {
            Ok(()) => tracing::debug!(slot = %id, "deallocated object"),
            Err(err) => {
                MetricsTracker::record(&self.metrics.failed_deallocations);
                tracing::warn!(slot = %id, error = %err, "deallocation failed");
                self.failures.push(PoolError::deallocation(err));
            }
        }
    }

    fn retire(&self) {
        self.lifecycle.retire();
        // Wake claimants that may now allocate, or must notice the shutdown
        self.queue.signal_all();
    }

    fn reconcile(&self) -> usize {
        let excess = self.lifecycle.live().saturating_sub(self.target());
        if excess == 0 || self.queue.is_empty() {
            return 0;
        }
        let drained = self.queue.drain_excess(excess);
        let count = drained.len();
        for slot in drained {
            self.destroy(slot);
        }
        if count > 0 {
            tracing::debug!(destroyed = count, target = self.target(), "reconciled pool size");
        }
        count
    }
}

impl<A: Allocator> Drop for Shared<A> {
    fn drop(&mut self) {
        for mut slot in self.queue.drain() {
            let id = slot.id();
            if let Some(object) = slot.kill() {
                self.deallocate(id, object);
            }
        }
    }
}

/// Bounded, thread-safe pool of reusable objects.
///
/// Objects are allocated lazily by the configured [`Allocator`] up to the
/// target size, checked against the [`Expiration`] on every claim, and
/// destroyed through the allocator when they expire or the pool shuts down.
/// Available objects are handed out in the configured [`QueueOrdering`],
/// first-in first-out by default.
///
/// `Pool` is a cheap handle; clones share the same slots.
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration, PoolError};
/// use std::time::Duration;
///
/// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(String::from("conn"))))).unwrap();
///
/// let conn = pool.claim(Duration::from_secs(1)).unwrap();
/// assert_eq!(conn.as_str(), "conn");
///
/// // The single slot is taken
/// assert!(matches!(pool.try_claim(), Err(PoolError::Timeout(_))));
///
/// drop(conn);
/// assert!(pool.try_claim().is_ok());
///
/// assert!(pool.shutdown().wait(Duration::from_secs(1)));
/// ```
pub struct Pool<A: Allocator> {
    shared: Arc<Shared<A>>,
}

impl<A: Allocator> Clone for Pool<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Allocator> Pool<A> {
    /// Create a new pool. No object is allocated until it is first claimed
    /// or the pool is warmed up.
    pub fn new(config: PoolConfiguration<A>) -> PoolResult<Self> {
        config.validate()?;
        let PoolConfiguration {
            allocator,
            expiration,
            size,
            claim_timeout,
            ordering,
        } = config;

        tracing::debug!(size, ?ordering, ?claim_timeout, "creating pool");

        Ok(Self {
            shared: Arc::new(Shared {
                allocator,
                expiration,
                queue: AvailabilityQueue::new(ordering, size),
                claimed: DashMap::new(),
                target: AtomicUsize::new(size),
                next_id: AtomicUsize::new(0),
                lifecycle: Arc::new(ShutdownController::new()),
                metrics: MetricsTracker::new(),
                failures: SegQueue::new(),
                claim_timeout,
            }),
        })
    }

    /// Claim an object, waiting up to `timeout` for one to become available.
    ///
    /// A zero timeout tries once without blocking. Fails with
    /// [`PoolError::Timeout`] when the budget runs out,
    /// [`PoolError::PoolShutDown`] once shutdown has begun, and
    /// [`PoolError::AllocationFailed`] when this claim had to build an object
    /// and the allocator failed.
    ///
    /// An allocation this claim started is allowed to finish, so with a slow
    /// allocator the call can return later than `timeout`.
    pub fn claim(&self, timeout: Duration) -> PoolResult<Claimed<A>> {
        let deadline = Instant::now().checked_add(timeout);
        self.shared.claim(deadline, timeout)
    }

    /// Claim without blocking
    pub fn try_claim(&self) -> PoolResult<Claimed<A>> {
        self.claim(Duration::ZERO)
    }

    /// Claim with the configured default timeout, or wait as long as it
    /// takes when none is configured
    pub fn claim_default(&self) -> PoolResult<Claimed<A>> {
        match self.shared.claim_timeout {
            Some(timeout) => self.claim(timeout),
            None => self.shared.claim(None, Duration::MAX),
        }
    }

    /// Claim from async code. The wait happens on a blocking task so the
    /// runtime's worker threads stay free.
    pub async fn claim_async(&self, timeout: Duration) -> PoolResult<Claimed<A>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.claim(timeout))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Release a claimed object back into this pool.
    ///
    /// # Panics
    ///
    /// If the claim was handed out by a different pool.
    pub fn release(&self, claimed: Claimed<A>) {
        assert!(
            claimed.belongs_to(self),
            "{} released into a pool that did not hand it out",
            claimed.slot_id()
        );
        claimed.release();
    }

    /// Begin shutting down. Claims fail from now on, available objects are
    /// destroyed right away and claimed ones when they are released.
    ///
    /// Idempotent; every call returns a handle on the same completion.
    pub fn shutdown(&self) -> Completion {
        let shared = &self.shared;
        if shared.lifecycle.begin() {
            tracing::info!(
                live = shared.lifecycle.live(),
                claimed = shared.claimed.len(),
                "shutting down pool"
            );
            shared.queue.signal_all();
            shared.drain_available();
            shared.lifecycle.try_complete();
        }
        Completion::new(Arc::clone(&shared.lifecycle))
    }

    /// Change the number of slots the pool maintains. Never blocks.
    ///
    /// Growing lets claims allocate more objects on demand. Shrinking destroys
    /// idle excess slots now, and claimed ones as they come back.
    pub fn set_target_size(&self, size: usize) -> PoolResult<()> {
        if size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "size must be at least 1".to_string(),
            ));
        }
        let previous = self.shared.target.swap(size, Ordering::SeqCst);
        tracing::debug!(previous, size, "target size changed");

        if size > previous {
            self.shared.queue.signal_all();
        } else {
            self.shared.reconcile();
        }
        Ok(())
    }

    pub fn target_size(&self) -> usize {
        self.shared.target()
    }

    /// Destroy available slots while more slots are live than the target
    /// size allows. Returns how many were destroyed.
    pub fn reconcile(&self) -> usize {
        self.shared.reconcile()
    }

    /// Allocate up to `count` objects ahead of demand, never beyond the
    /// target size. Returns how many were allocated.
    pub fn warmup(&self, count: usize) -> PoolResult<usize> {
        let mut allocated = 0;
        while allocated < count {
            match self.shared.allocate_slot()? {
                Some(slot) => {
                    self.shared.make_available(slot);
                    allocated += 1;
                }
                None => break,
            }
        }
        Ok(allocated)
    }

    /// Async variant of [`warmup`](Self::warmup)
    pub async fn warmup_async(&self, count: usize) -> PoolResult<usize> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.warmup(count))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Allocated slots, claimed and available
    pub fn live_slots(&self) -> usize {
        self.shared.lifecycle.live()
    }

    pub fn available_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn claimed_count(&self) -> usize {
        self.shared.claimed.len()
    }

    pub fn ordering(&self) -> QueueOrdering {
        self.shared.queue.ordering()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    pub fn allocator(&self) -> &A {
        &self.shared.allocator
    }

    /// Deallocation errors collected since the last call
    pub fn take_deallocation_failures(&self) -> Vec<PoolError> {
        std::iter::from_fn(|| self.shared.failures.pop()).collect()
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        let shared = &self.shared;
        shared.metrics.get_metrics(Gauges {
            claimed: shared.claimed.len(),
            available: shared.queue.len(),
            live: shared.lifecycle.live(),
            target: shared.target(),
            waiters: shared.queue.waiters(),
        })
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::new(&self.metrics(), self.lifecycle_state())
    }
}

impl<A: Allocator> fmt::Debug for Pool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("target_size", &self.target_size())
            .field("live_slots", &self.live_slots())
            .field("available", &self.available_count())
            .field("lifecycle", &self.lifecycle_state())
            .finish()
    }
}
