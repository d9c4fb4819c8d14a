//! Pool lifecycle, live slot accounting and the shutdown completion handle

use crate::errors::{PoolError, PoolResult};
use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a pool. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleState {
    Running,
    ShuttingDown,
    ShutDown,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            RUNNING => LifecycleState::Running,
            SHUTTING_DOWN => LifecycleState::ShuttingDown,
            _ => LifecycleState::ShutDown,
        }
    }
}

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Owns the lifecycle state together with the live slot count, since the
/// shutdown is complete exactly when the count drops to zero after the
/// state left `Running`.
///
/// Reservations bump the count before checking the state, and completion
/// checks the state before reading the count. With sequentially consistent
/// accesses on both sides, a reservation racing with shutdown either is seen
/// by the completion check or sees the shutdown itself; no object is ever
/// allocated after the completion fired.
pub(crate) struct ShutdownController {
    state: AtomicU8,
    live: CachePadded<AtomicUsize>,
    done: Mutex<bool>,
    finished: Condvar,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            live: CachePadded::new(AtomicUsize::new(0)),
            done: Mutex::new(false),
            finished: Condvar::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Allocated slots, claimed and available
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Reserve room for one more slot if fewer than `target` are live
    pub fn try_reserve(&self, target: usize) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < target).then_some(live + 1)
            })
            .is_ok()
    }

    /// Give back one slot's worth of capacity, completing the shutdown if
    /// this was the last one
    pub fn retire(&self) -> usize {
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        self.try_complete();
        remaining
    }

    /// Move from running to shutting down. Returns false if shutdown had
    /// already begun.
    pub fn begin(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Finish the shutdown if it has begun and no slot is live anymore.
    /// Safe to call any number of times from any thread; only one call wins.
    pub fn try_complete(&self) -> bool {
        if self.state.load(Ordering::SeqCst) != SHUTTING_DOWN || self.live() != 0 {
            return false;
        }
        let won = self
            .state
            .compare_exchange(SHUTTING_DOWN, SHUT_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            tracing::info!("pool shut down, every slot destroyed");
            *self.done.lock() = true;
            self.finished.notify_all();
        }
        won
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock()
    }

    /// Block until the shutdown completes or the timeout runs out
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut done = self.done.lock();
        while !*done {
            match deadline {
                Some(deadline) => {
                    if self.finished.wait_until(&mut done, deadline).timed_out() {
                        return *done;
                    }
                }
                None => self.finished.wait(&mut done),
            }
        }
        true
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on an ongoing pool shutdown.
///
/// Every call to [`Pool::shutdown`](crate::Pool::shutdown) returns a handle on
/// the same completion. The handle does not keep the pool alive.
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(0u8))).with_size(2)).unwrap();
/// let claimed = pool.claim(Duration::from_secs(1)).unwrap();
///
/// let completion = pool.shutdown();
/// // Still waiting for the claimed object to come back
/// assert!(!completion.wait(Duration::from_millis(10)));
///
/// drop(claimed);
/// assert!(completion.wait(Duration::from_secs(1)));
/// ```
#[derive(Clone)]
pub struct Completion {
    controller: Arc<ShutdownController>,
}

impl Completion {
    pub(crate) fn new(controller: Arc<ShutdownController>) -> Self {
        Self { controller }
    }

    /// Wait up to `timeout` for every pooled object to be destroyed.
    /// Returns whether the shutdown finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.controller.wait(Some(timeout))
    }

    /// Wait without a time limit
    pub fn wait_forever(&self) {
        self.controller.wait(None);
    }

    pub fn is_done(&self) -> bool {
        self.controller.is_done()
    }

    /// Wait asynchronously, parking a blocking task instead of the runtime thread
    pub async fn wait_async(&self, timeout: Duration) -> PoolResult<bool> {
        let controller = Arc::clone(&self.controller);
        tokio::task::spawn_blocking(move || controller.wait(Some(timeout)))
            .await
            .map_err(|_| PoolError::Cancelled)
    }

    /// Whether both handles track the same shutdown
    pub fn same_as(&self, other: &Completion) -> bool {
        Arc::ptr_eq(&self.controller, &other.controller)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.controller.state())
            .field("live", &self.controller.live())
            .finish()
    }
}
