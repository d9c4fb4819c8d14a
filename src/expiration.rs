//! Expiration policies deciding when a pooled object must be replaced

use crate::slot::SlotInfo;
use std::time::Duration;

/// Decides whether the object in a slot must be destroyed and replaced
/// instead of being handed out.
///
/// Implementations must be pure: the pool may call them redundantly, always
/// from the thread that currently holds the slot. Any
/// `Fn(&SlotInfo) -> bool` closure is an expiration.
pub trait Expiration: Send + Sync + 'static {
    fn has_expired(&self, info: &SlotInfo) -> bool;
}

impl<F> Expiration for F
where
    F: Fn(&SlotInfo) -> bool + Send + Sync + 'static,
{
    fn has_expired(&self, info: &SlotInfo) -> bool {
        self(info)
    }
}

/// Built-in expiration policies
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, ExpirationPolicy, Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// // Replace objects after an hour, or after they were handed out 1000 times
/// let config = PoolConfiguration::new(allocator_fn(|_| Ok(String::new())))
///     .with_size(4)
///     .with_expiration(ExpirationPolicy::Combined {
///         ttl: Duration::from_secs(3600),
///         max_claims: Some(1000),
///         idle_timeout: None,
///     });
///
/// let pool = Pool::new(config).unwrap();
/// # drop(pool);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExpirationPolicy {
    /// Objects never expire
    #[default]
    Never,

    /// Objects expire a fixed duration after allocation
    TimeToLive(Duration),

    /// Objects expire after sitting unclaimed for too long
    IdleTimeout(Duration),

    /// Objects expire once they have been claimed this many times
    MaxClaims(u64),

    /// TTL, optionally combined with claim count and idle limits; any one
    /// of them triggers expiration
    Combined {
        ttl: Duration,
        max_claims: Option<u64>,
        idle_timeout: Option<Duration>,
    },
}

impl Expiration for ExpirationPolicy {
    fn has_expired(&self, info: &SlotInfo) -> bool {
        match self {
            ExpirationPolicy::Never => false,
            ExpirationPolicy::TimeToLive(ttl) => info.age() > *ttl,
            ExpirationPolicy::IdleTimeout(timeout) => info.idle() > *timeout,
            ExpirationPolicy::MaxClaims(max) => info.claim_count() >= *max,
            ExpirationPolicy::Combined {
                ttl,
                max_claims,
                idle_timeout,
            } => {
                info.age() > *ttl
                    || max_claims.is_some_and(|max| info.claim_count() >= max)
                    || idle_timeout.is_some_and(|idle| info.idle() > idle)
            }
        }
    }
}

/// Expired when either side says so
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

/// Expired only when both sides agree
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<A: Expiration, B: Expiration> Expiration for Or<A, B> {
    fn has_expired(&self, info: &SlotInfo) -> bool {
        self.0.has_expired(info) || self.1.has_expired(info)
    }
}

impl<A: Expiration, B: Expiration> Expiration for And<A, B> {
    fn has_expired(&self, info: &SlotInfo) -> bool {
        self.0.has_expired(info) && self.1.has_expired(info)
    }
}

/// Combinators over [`Expiration`]
///
/// # Examples
///
/// ```
/// use esox_slotpool::{Expiration, ExpirationExt, ExpirationPolicy, SlotInfo};
/// use std::time::Duration;
///
/// let policy = ExpirationPolicy::MaxClaims(10)
///     .or(|info: &SlotInfo| info.age() > Duration::from_secs(30));
///
/// assert!(policy.has_expired(&SlotInfo::for_testing(Duration::from_secs(31), 0, None)));
/// assert!(!policy.has_expired(&SlotInfo::for_testing(Duration::from_secs(1), 2, None)));
/// ```
pub trait ExpirationExt: Expiration + Sized {
    fn or<E: Expiration>(self, other: E) -> Or<Self, E> {
        Or(self, other)
    }

    fn and<E: Expiration>(self, other: E) -> And<Self, E> {
        And(self, other)
    }
}

impl<T: Expiration> ExpirationExt for T {}
