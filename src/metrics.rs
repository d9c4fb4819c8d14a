//! Metrics collection and export for slot pools

use crossbeam::utils::CachePadded;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of a pool's counters and gauges
///
/// # Examples
///
/// ```
/// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
/// use std::time::Duration;
///
/// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(1u32))).with_size(3)).unwrap();
///
/// {
///     let _obj = pool.claim(Duration::from_secs(1)).unwrap();
///     let metrics = pool.metrics();
///     assert_eq!(metrics.claims, 1);
///     assert_eq!(metrics.allocations, 1);
///     assert_eq!(metrics.claimed_objects, 1);
/// }
/// assert_eq!(pool.metrics().releases, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Successful claims
    pub claims: usize,

    /// Releases, including those that destroyed the object
    pub releases: usize,

    /// Objects successfully built by the allocator
    pub allocations: usize,

    /// Allocator failures
    pub failed_allocations: usize,

    /// Objects handed back to the allocator for destruction
    pub deallocations: usize,

    /// Deallocations that reported an error
    pub failed_deallocations: usize,

    /// Objects replaced because the expiration said so
    pub expirations: usize,

    /// Claims that ran out of time
    pub timeouts: usize,

    /// Objects currently lent to callers
    pub claimed_objects: usize,

    /// Objects waiting in the availability queue
    pub available_objects: usize,

    /// Allocated slots, claimed and available
    pub live_slots: usize,

    /// Configured capacity
    pub target_size: usize,

    /// Threads currently blocked in a claim
    pub waiters: usize,

    /// Claimed objects relative to the target size (0.0 to 1.0, or above while shrinking)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("claims".to_string(), self.claims.to_string());
        metrics.insert("releases".to_string(), self.releases.to_string());
        metrics.insert("allocations".to_string(), self.allocations.to_string());
        metrics.insert("failed_allocations".to_string(), self.failed_allocations.to_string());
        metrics.insert("deallocations".to_string(), self.deallocations.to_string());
        metrics.insert("failed_deallocations".to_string(), self.failed_deallocations.to_string());
        metrics.insert("expirations".to_string(), self.expirations.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("claimed_objects".to_string(), self.claimed_objects.to_string());
        metrics.insert("available_objects".to_string(), self.available_objects.to_string());
        metrics.insert("live_slots".to_string(), self.live_slots.to_string());
        metrics.insert("target_size".to_string(), self.target_size.to_string());
        metrics.insert("waiters".to_string(), self.waiters.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(0u8)))).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags));
    /// assert!(output.contains("slotpool_slots_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges: [(&str, &str, f64); 6] = [
            ("slotpool_objects_claimed", "Objects currently claimed", metrics.claimed_objects as f64),
            ("slotpool_objects_available", "Objects waiting to be claimed", metrics.available_objects as f64),
            ("slotpool_slots_live", "Allocated slots", metrics.live_slots as f64),
            ("slotpool_slots_target", "Configured pool size", metrics.target_size as f64),
            ("slotpool_claim_waiters", "Threads blocked in claim", metrics.waiters as f64),
            ("slotpool_utilization", "Pool utilization ratio", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} gauge", name);
            let _ = writeln!(output, "{}{{{}}} {}", name, labels, value);
        }

        let counters: [(&str, &str, usize); 8] = [
            ("slotpool_claims_total", "Successful claims", metrics.claims),
            ("slotpool_releases_total", "Releases", metrics.releases),
            ("slotpool_allocations_total", "Objects allocated", metrics.allocations),
            ("slotpool_allocation_failures_total", "Failed allocations", metrics.failed_allocations),
            ("slotpool_deallocations_total", "Objects deallocated", metrics.deallocations),
            ("slotpool_deallocation_failures_total", "Failed deallocations", metrics.failed_deallocations),
            ("slotpool_expirations_total", "Objects replaced after expiring", metrics.expirations),
            ("slotpool_claim_timeouts_total", "Claims that timed out", metrics.timeouts),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{}{{{}}} {}", name, labels, value);
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker. Counters are cache padded since every claim and
/// release touches them from many threads.
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub claims: CachePadded<AtomicUsize>,
    pub releases: CachePadded<AtomicUsize>,
    pub allocations: CachePadded<AtomicUsize>,
    pub failed_allocations: AtomicUsize,
    pub deallocations: AtomicUsize,
    pub failed_deallocations: AtomicUsize,
    pub expirations: AtomicUsize,
    pub timeouts: AtomicUsize,
}

/// Gauges sampled from the pool when a snapshot is taken
pub(crate) struct Gauges {
    pub claimed: usize,
    pub available: usize,
    pub live: usize,
    pub target: usize,
    pub waiters: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, gauges: Gauges) -> PoolMetrics {
        let utilization = if gauges.target > 0 {
            gauges.claimed as f64 / gauges.target as f64
        } else {
            0.0
        };

        PoolMetrics {
            claims: self.claims.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            failed_deallocations: self.failed_deallocations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            claimed_objects: gauges.claimed,
            available_objects: gauges.available,
            live_slots: gauges.live,
            target_size: gauges.target,
            waiters: gauges.waiters,
            utilization,
        }
    }
}
