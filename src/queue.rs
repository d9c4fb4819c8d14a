//! Blocking queue of slots that are ready to be claimed

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Order in which available slots are handed out
///
/// `Fifo` hands out the slot that has been idle longest, which spreads claims
/// evenly over the pool and keeps idle times uniform. `Lifo` hands out the
/// most recently released slot, which keeps a small hot working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueOrdering {
    #[default]
    Fifo,
    Lifo,
}

/// Multi-producer multi-consumer queue with timed blocking polls.
///
/// Every mutation happens under the same mutex the waiters park on, so an
/// offer that lands between a waiter's emptiness check and its park is still
/// observed. Besides items, waiters also wake up when the epoch moves, which
/// the pool uses to signal freed capacity and shutdown.
pub(crate) struct AvailabilityQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    epoch: AtomicU64,
    waiters: AtomicUsize,
    ordering: QueueOrdering,
}

impl<T> AvailabilityQueue<T> {
    pub fn new(ordering: QueueOrdering, capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            epoch: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
            ordering,
        }
    }

    /// Add an item and wake one waiter. Never blocks beyond the short
    /// critical section.
    pub fn offer(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        drop(items);
        self.ready.notify_one();
    }

    pub fn try_poll(&self) -> Option<T> {
        let mut items = self.items.lock();
        self.take(&mut items)
    }

    /// Current epoch. Read it before deciding to wait, then pass it to
    /// [`poll`](Self::poll) so that a signal raised in between is not lost.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Wait for an item until `deadline` (forever when `None`).
    ///
    /// Returns `None` on timeout, or early when the epoch has moved past
    /// `seen_epoch`; callers re-evaluate their situation and poll again.
    pub fn poll(&self, deadline: Option<Instant>, seen_epoch: u64) -> Option<T> {
        let mut items = self.items.lock();
        self.waiters.fetch_add(1, Ordering::Relaxed);

        let item = loop {
            if let Some(item) = self.take(&mut items) {
                break Some(item);
            }
            if self.epoch.load(Ordering::SeqCst) != seen_epoch {
                break None;
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut items, deadline).timed_out() {
                        break self.take(&mut items);
                    }
                }
                None => self.ready.wait(&mut items),
            }
        };

        self.waiters.fetch_sub(1, Ordering::Relaxed);
        item
    }

    /// Advance the epoch and wake every waiter
    pub fn signal_all(&self) {
        let items = self.items.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        drop(items);
        self.ready.notify_all();
    }

    /// Remove every queued item
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock();
        items.drain(..).collect()
    }

    /// Remove up to `count` items from the end that would be handed out last
    pub fn drain_excess(&self, count: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let count = count.min(items.len());
        match self.ordering {
            QueueOrdering::Lifo => items.drain(..count).collect(),
            QueueOrdering::Fifo => {
                let start = items.len() - count;
                items.drain(start..).collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    pub fn ordering(&self) -> QueueOrdering {
        self.ordering
    }

    fn take(&self, items: &mut VecDeque<T>) -> Option<T> {
        match self.ordering {
            QueueOrdering::Fifo => items.pop_front(),
            QueueOrdering::Lifo => items.pop_back(),
        }
    }
}
