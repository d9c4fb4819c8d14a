//! Shared fixtures for the integration tests

#![allow(dead_code)]

use esox_slotpool::{Allocator, BoxError, SlotContext};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A pooled object that notices when two callers use it at once
#[derive(Debug)]
pub struct Resource {
    pub serial: usize,
    in_use: AtomicBool,
}

impl Resource {
    /// Mark the resource as used by the current caller. Returns false if
    /// somebody else already holds it.
    pub fn enter(&self) -> bool {
        !self.in_use.swap(true, Ordering::SeqCst)
    }

    pub fn leave(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Ledger {
    allocations: AtomicUsize,
    deallocations: Mutex<HashMap<usize, usize>>,
    fail_allocations: AtomicBool,
    fail_deallocations: AtomicBool,
}

/// Allocator that records every allocation and deallocation. The simulated
/// construction cost is an explicit parameter, not global state.
#[derive(Clone, Default)]
pub struct CountingAllocator {
    cost: Duration,
    ledger: Arc<Ledger>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(cost: Duration) -> Self {
        Self {
            cost,
            ..Self::default()
        }
    }

    pub fn allocations(&self) -> usize {
        self.ledger.allocations.load(Ordering::SeqCst)
    }

    pub fn deallocations(&self) -> usize {
        self.ledger.deallocations.lock().values().sum()
    }

    /// True when every allocated object was deallocated exactly once
    pub fn all_deallocated_once(&self) -> bool {
        let deallocations = self.ledger.deallocations.lock();
        let allocations = self.allocations();
        deallocations.len() == allocations
            && (0..allocations).all(|serial| deallocations.get(&serial) == Some(&1))
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.ledger.fail_allocations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deallocations(&self, fail: bool) {
        self.ledger.fail_deallocations.store(fail, Ordering::SeqCst);
    }
}

impl Allocator for CountingAllocator {
    type Object = Resource;

    fn allocate(&self, _ctx: &SlotContext) -> Result<Resource, BoxError> {
        if !self.cost.is_zero() {
            thread::sleep(self.cost);
        }
        if self.ledger.fail_allocations.load(Ordering::SeqCst) {
            return Err("allocation refused".into());
        }
        let serial = self.ledger.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(Resource {
            serial,
            in_use: AtomicBool::new(false),
        })
    }

    fn deallocate(&self, object: Resource) -> Result<(), BoxError> {
        *self
            .ledger
            .deallocations
            .lock()
            .entry(object.serial)
            .or_insert(0) += 1;
        if self.ledger.fail_deallocations.load(Ordering::SeqCst) {
            return Err(format!("could not close resource {}", object.serial).into());
        }
        Ok(())
    }
}
