//! Basic usage examples for the slot pool

use esox_slotpool::{allocator_fn, Pool, PoolConfiguration, PoolError};
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== esox_slotpool - Basic Examples ===\n");

    // Example 1: Simple pool
    simple_pool();

    // Example 2: Timeouts
    timeouts();

    // Example 3: Metrics and health
    metrics_and_health();

    // Example 4: Shutdown
    shutdown();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = Pool::new(
        PoolConfiguration::new(allocator_fn(|ctx| Ok(format!("buffer-{}", ctx.slot)))).with_size(3),
    )
    .unwrap();

    {
        let obj = pool.claim(Duration::from_secs(1)).unwrap();
        println!("   Claimed: {}", *obj);
        // Released when dropped
    }

    println!("   Available after release: {}\n", pool.available_count());
}

fn timeouts() {
    println!("2. Timeouts:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(42)))).unwrap();

    let obj = pool.try_claim().unwrap();
    println!("   First claim: {}", *obj);

    match pool.claim(Duration::from_millis(50)) {
        Ok(_) => println!("   Second claim: unexpected success"),
        Err(PoolError::Timeout(budget)) => println!("   Second claim: timed out after {:?}", budget),
        Err(e) => println!("   Second claim: {}", e),
    }

    obj.release();
    println!("   Third claim after release: {}\n", pool.try_claim().is_ok());
}

fn metrics_and_health() {
    println!("3. Metrics and Health:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(0u64))).with_size(5)).unwrap();

    {
        let _obj1 = pool.claim(Duration::from_secs(1)).unwrap();
        let _obj2 = pool.claim(Duration::from_secs(1)).unwrap();

        let health = pool.health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Claimed: {}, Available: {}", health.claimed_objects, health.available_objects);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    let mut keys: Vec<_> = metrics.keys().collect();
    keys.sort();
    for key in keys {
        println!("     {}: {}", key, metrics[key]);
    }
    println!();
}

fn shutdown() {
    println!("4. Shutdown:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(vec![0u8; 64]))).with_size(2)).unwrap();
    pool.warmup(2).unwrap();

    let held = pool.claim(Duration::from_secs(1)).unwrap();
    let completion = pool.shutdown();
    println!("   Finished while an object is claimed: {}", completion.wait(Duration::from_millis(10)));

    drop(held);
    println!("   Finished after release: {}", completion.wait(Duration::from_secs(1)));
    println!("   State: {:?}", pool.lifecycle_state());
}
