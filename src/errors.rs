//! Error types for the slot pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by [`Allocator`](crate::Allocator) implementations
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared form of a collaborator error, so that [`PoolError`] stays `Clone`
pub type SharedError = Arc<dyn StdError + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// No slot could be obtained within the claim budget. The caller may retry.
    #[error("Claim timed out after {0:?}")]
    Timeout(Duration),

    /// The pool has begun shutting down and hands out nothing anymore.
    #[error("Pool has been shut down")]
    PoolShutDown,

    #[error("Allocation failed: {0}")]
    AllocationFailed(#[source] SharedError),

    #[error("Deallocation failed: {0}")]
    DeallocationFailed(#[source] SharedError),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    pub(crate) fn allocation(err: BoxError) -> Self {
        PoolError::AllocationFailed(Arc::from(err))
    }

    pub(crate) fn deallocation(err: BoxError) -> Self {
        PoolError::DeallocationFailed(Arc::from(err))
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoolError::Timeout(_) | PoolError::AllocationFailed(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
