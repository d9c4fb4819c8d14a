//! # esox_slotpool
//!
//! Bounded, thread-safe pool of reusable, expensive-to-construct objects.
//!
//! ## Features
//!
//! - Blocking claims with a timeout budget, zero meaning "try once"
//! - Release from any thread, automatically via RAII (Drop trait)
//! - Pluggable allocation and deallocation through the [`Allocator`] trait
//! - Pluggable expiration: built-in policies, closures, combinators
//! - Expired objects are replaced in place on claim
//! - Resizing at runtime without blocking
//! - Graceful shutdown that destroys every object exactly once
//! - Metrics, Prometheus export and health reporting
//! - Async wrappers for use from tokio
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_slotpool::{allocator_fn, ExpirationPolicy, Pool, PoolConfiguration};
//! use std::time::Duration;
//!
//! let config = PoolConfiguration::new(allocator_fn(|_ctx| Ok(vec![0u8; 1024])))
//!     .with_size(4)
//!     .with_expiration(ExpirationPolicy::MaxClaims(100));
//! let pool = Pool::new(config).unwrap();
//!
//! {
//!     let buffer = pool.claim(Duration::from_secs(1)).unwrap();
//!     println!("Got {} bytes", buffer.len());
//!     // Object automatically released when `buffer` goes out of scope
//! }
//!
//! assert!(pool.shutdown().wait(Duration::from_secs(1)));
//! ```

mod allocator;
mod config;
mod errors;
mod expiration;
mod health;
mod metrics;
mod pool;
mod queue;
mod shutdown;
mod slot;

pub use allocator::{allocator_fn, Allocator, FnAllocator};
pub use config::PoolConfiguration;
pub use errors::{BoxError, PoolError, PoolResult, SharedError};
pub use expiration::{And, Expiration, ExpirationExt, ExpirationPolicy, Or};
pub use health::HealthStatus;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{Claimed, Pool};
pub use queue::QueueOrdering;
pub use shutdown::{Completion, LifecycleState};
pub use slot::{SlotContext, SlotId, SlotInfo};
