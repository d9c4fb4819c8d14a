//! Health reporting for slot pools

use crate::metrics::PoolMetrics;
use crate::shutdown::LifecycleState;

/// Health status of a slot pool
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
///
/// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(0u8))).with_size(3)).unwrap();
///
/// let health = pool.health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.target_size, 3);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Objects waiting to be claimed
    pub available_objects: usize,

    /// Objects lent to callers
    pub claimed_objects: usize,

    /// Configured capacity
    pub target_size: usize,

    /// Lifecycle of the pool
    pub lifecycle: LifecycleState,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub(crate) fn new(metrics: &PoolMetrics, lifecycle: LifecycleState) -> Self {
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if lifecycle != LifecycleState::Running {
            warnings.push(format!("Pool is {:?}", lifecycle));
            is_healthy = false;
        }

        if metrics.utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", metrics.utilization * 100.0));
            is_healthy = false;
        }

        if metrics.waiters > 0 {
            warnings.push(format!("{} claimants waiting", metrics.waiters));
        }

        // Every allocation attempt failing means the pool cannot replace anything
        if metrics.failed_allocations > 0 && metrics.allocations == 0 {
            warnings.push(format!("All {} allocations failed", metrics.failed_allocations));
            is_healthy = false;
        }

        if metrics.failed_deallocations > 0 {
            warnings.push(format!("{} deallocations failed", metrics.failed_deallocations));
        }

        Self {
            is_healthy,
            utilization: metrics.utilization,
            available_objects: metrics.available_objects,
            claimed_objects: metrics.claimed_objects,
            target_size: metrics.target_size,
            lifecycle,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}
