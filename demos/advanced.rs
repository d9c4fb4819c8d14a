//! Advanced features: custom allocators, expiration, resizing, contention

use esox_slotpool::{
    Allocator, BoxError, ExpirationExt, ExpirationPolicy, Pool, PoolConfiguration, QueueOrdering,
    SlotContext, SlotInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Connection {
    id: usize,
    data: String,
}

/// Opens and closes fake connections, taking `latency` to open each one
struct ConnectionFactory {
    latency: Duration,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ConnectionFactory {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }
}

impl Allocator for ConnectionFactory {
    type Object = Connection;

    fn allocate(&self, ctx: &SlotContext) -> Result<Connection, BoxError> {
        thread::sleep(self.latency);
        let id = self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Connection {
            id,
            data: format!("Connection-{} in {}", id, ctx.slot),
        })
    }

    fn deallocate(&self, conn: Connection) -> Result<(), BoxError> {
        self.closed.fetch_add(1, Ordering::Relaxed);
        println!("   Closing {}", conn.data);
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== esox_slotpool - Advanced Features ===\n");

    // Example 1: Expiration
    expiration();

    // Example 2: Resizing
    resizing();

    // Example 3: Contention
    contention();

    // Example 4: Prometheus metrics
    prometheus_export();
}

fn expiration() {
    println!("1. Expiration:");

    let policy = ExpirationPolicy::MaxClaims(3)
        .or(|info: &SlotInfo| info.age() > Duration::from_secs(60));
    let config = PoolConfiguration::new(ConnectionFactory::new(Duration::from_millis(5)))
        .with_expiration(policy);
    let pool = Pool::new(config).unwrap();

    for round in 0..7 {
        let conn = pool.claim(Duration::from_secs(1)).unwrap();
        println!("   Round {}: connection {} (claim #{})", round, conn.id, conn.slot_info().claim_count());
    }

    let factory = pool.allocator();
    println!(
        "   Opened {}, closed {}\n",
        factory.opened.load(Ordering::Relaxed),
        factory.closed.load(Ordering::Relaxed)
    );
}

fn resizing() {
    println!("2. Resizing:");

    let pool = Pool::new(PoolConfiguration::new(ConnectionFactory::new(Duration::ZERO)).with_size(4)).unwrap();
    pool.warmup(4).unwrap();
    println!("   Live slots: {}", pool.live_slots());

    pool.set_target_size(2).unwrap();
    println!("   After shrinking to 2: {}", pool.live_slots());

    pool.set_target_size(3).unwrap();
    let _a = pool.claim(Duration::from_secs(1)).unwrap();
    let _b = pool.claim(Duration::from_secs(1)).unwrap();
    let _c = pool.claim(Duration::from_secs(1)).unwrap();
    println!("   After growing to 3 and claiming three: {}\n", pool.live_slots());
}

fn contention() {
    println!("3. Contention:");

    let config = PoolConfiguration::new(ConnectionFactory::new(Duration::from_millis(1)))
        .with_size(4)
        .with_ordering(QueueOrdering::Lifo);
    let pool = Pool::new(config).unwrap();

    let start = Instant::now();
    let workers: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let conn = pool.claim(Duration::from_secs(10)).unwrap();
                    std::hint::black_box(&conn.data);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let elapsed = start.elapsed();
    println!("   16000 cycles in {:?} ({:.0} cycles/s)", elapsed, 16000.0 / elapsed.as_secs_f64());
    println!("   Live slots: {}", pool.live_slots());

    let completion = pool.shutdown();
    println!("   Shut down: {}\n", completion.wait(Duration::from_secs(1)));
}

fn prometheus_export() {
    println!("4. Prometheus Metrics Export:");

    let pool = Pool::new(PoolConfiguration::new(ConnectionFactory::new(Duration::ZERO)).with_size(5)).unwrap();

    {
        let _conn1 = pool.claim(Duration::from_secs(1)).unwrap();
        let _conn2 = pool.claim(Duration::from_secs(1)).unwrap();

        let mut tags = std::collections::HashMap::new();
        tags.insert("service".to_string(), "example".to_string());
        tags.insert("env".to_string(), "dev".to_string());

        let prometheus_text = pool.export_metrics_prometheus("example_pool", Some(&tags));
        println!("{}", prometheus_text);
    }
}
