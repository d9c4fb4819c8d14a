//! Pool configuration options

use crate::allocator::Allocator;
use crate::errors::{PoolError, PoolResult};
use crate::expiration::{Expiration, ExpirationPolicy};
use crate::queue::QueueOrdering;
use std::fmt;
use std::time::Duration;

/// Configuration for a slot pool
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, ExpirationPolicy, PoolConfiguration, QueueOrdering};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new(allocator_fn(|_| Ok(Vec::<u8>::with_capacity(1024))))
///     .with_size(10)
///     .with_expiration(ExpirationPolicy::MaxClaims(500))
///     .with_claim_timeout(Duration::from_secs(5))
///     .with_ordering(QueueOrdering::Lifo);
///
/// assert_eq!(config.size, 10);
/// assert_eq!(config.claim_timeout, Some(Duration::from_secs(5)));
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfiguration<A: Allocator> {
    /// Builds and destroys the pooled objects
    pub allocator: A,

    /// Decides when an object must be replaced before it is handed out
    pub expiration: Box<dyn Expiration>,

    /// Number of slots the pool maintains
    pub size: usize,

    /// Timeout used by [`Pool::claim_default`](crate::Pool::claim_default);
    /// `None` waits indefinitely
    pub claim_timeout: Option<Duration>,

    /// Order in which available slots are handed out
    pub ordering: QueueOrdering,
}

impl<A: Allocator> PoolConfiguration<A> {
    /// Create a configuration with default values: size 1, never-expiring
    /// objects, no default claim timeout, FIFO ordering
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            expiration: Box::new(ExpirationPolicy::Never),
            size: 1,
            claim_timeout: None,
            ordering: QueueOrdering::default(),
        }
    }

    /// Set the number of slots
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the expiration, either an [`ExpirationPolicy`] or a closure
    pub fn with_expiration<E: Expiration>(mut self, expiration: E) -> Self {
        self.expiration = Box::new(expiration);
        self
    }

    /// Set the default claim timeout
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = Some(timeout);
        self
    }

    pub fn with_ordering(mut self, ordering: QueueOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Check the configuration for values the pool cannot work with
    pub fn validate(&self) -> PoolResult<()> {
        if self.size == 0 {
            return Err(PoolError::InvalidConfiguration(
                "size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl<A: Allocator> fmt::Debug for PoolConfiguration<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("size", &self.size)
            .field("claim_timeout", &self.claim_timeout)
            .field("ordering", &self.ordering)
            .finish_non_exhaustive()
    }
}
