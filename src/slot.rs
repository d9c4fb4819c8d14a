//! Slots bind one pooled object to its lifecycle state and metadata

use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of a slot within its pool.
///
/// The id survives reallocation: an expired object is replaced in place and
/// the fresh object keeps living in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Holds an object and sits in the availability queue
    Living,

    /// Holds an object that is lent to a caller
    Claimed,

    /// Holds no object; it is being reallocated or dropped
    Dead,

    /// The expiration said no; the object is about to be destroyed
    Expired,
}

/// Passed to [`Allocator::allocate`](crate::Allocator::allocate)
#[derive(Debug, Clone, Copy)]
pub struct SlotContext {
    /// The slot the new object will live in
    pub slot: SlotId,

    /// True when replacing an expired object rather than filling a new slot
    pub reallocation: bool,
}

/// Read-only view of a slot's metadata, handed to expiration checks.
///
/// # Examples
///
/// ```
/// use esox_slotpool::{Expiration, ExpirationPolicy, SlotInfo};
/// use std::time::Duration;
///
/// let info = SlotInfo::for_testing(Duration::from_secs(10), 3, None);
/// assert!(ExpirationPolicy::MaxClaims(3).has_expired(&info));
/// assert!(!ExpirationPolicy::TimeToLive(Duration::from_secs(60)).has_expired(&info));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SlotInfo {
    slot: SlotId,
    age: Duration,
    claim_count: u64,
    last_claimed_at: Option<Instant>,
    idle: Duration,
}

impl SlotInfo {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Time since the current object was allocated
    pub fn age(&self) -> Duration {
        self.age
    }

    /// Number of times the current object has been claimed
    pub fn claim_count(&self) -> u64 {
        self.claim_count
    }

    pub fn last_claimed_at(&self) -> Option<Instant> {
        self.last_claimed_at
    }

    /// Time since the object was last claimed, or its age if never claimed
    pub fn idle(&self) -> Duration {
        self.idle
    }

    /// Build an info value by hand, for exercising expiration policies
    pub fn for_testing(age: Duration, claim_count: u64, idle: Option<Duration>) -> Self {
        Self {
            slot: SlotId(0),
            age,
            claim_count,
            last_claimed_at: None,
            idle: idle.unwrap_or(age),
        }
    }
}

/// A slot owned by the pool, or by a claim handle while claimed
pub(crate) struct Slot<T> {
    id: SlotId,
    object: Option<T>,
    state: SlotState,
    created_at: Instant,
    claim_count: u64,
    last_claimed_at: Option<Instant>,
}

impl<T> Slot<T> {
    pub fn new(id: SlotId, object: T) -> Self {
        Self {
            id,
            object: Some(object),
            state: SlotState::Living,
            created_at: Instant::now(),
            claim_count: 0,
            last_claimed_at: None,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn info(&self) -> SlotInfo {
        let now = Instant::now();
        let age = now.saturating_duration_since(self.created_at);
        let idle = self
            .last_claimed_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(age);

        SlotInfo {
            slot: self.id,
            age,
            claim_count: self.claim_count,
            last_claimed_at: self.last_claimed_at,
            idle,
        }
    }

    pub fn object(&self) -> Option<&T> {
        self.object.as_ref()
    }

    pub fn object_mut(&mut self) -> Option<&mut T> {
        self.object.as_mut()
    }

    pub fn mark_claimed(&mut self) {
        debug_assert_eq!(self.state, SlotState::Living, "{} claimed while {:?}", self.id, self.state);
        self.state = SlotState::Claimed;
        self.claim_count += 1;
        self.last_claimed_at = Some(Instant::now());
    }

    pub fn mark_living(&mut self) {
        debug_assert_eq!(self.state, SlotState::Claimed, "{} released while {:?}", self.id, self.state);
        self.state = SlotState::Living;
    }

    pub fn mark_expired(&mut self) {
        self.state = SlotState::Expired;
    }

    /// Take the object out, leaving the slot dead
    pub fn kill(&mut self) -> Option<T> {
        self.state = SlotState::Dead;
        self.object.take()
    }

    /// Put a freshly allocated object into a dead slot and reset its metadata
    pub fn revive(&mut self, object: T) {
        debug_assert_eq!(self.state, SlotState::Dead);
        self.object = Some(object);
        self.state = SlotState::Living;
        self.created_at = Instant::now();
        self.claim_count = 0;
        self.last_claimed_at = None;
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("claim_count", &self.claim_count)
            .finish()
    }
}
