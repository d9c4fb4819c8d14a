//! Async usage examples

use esox_slotpool::{allocator_fn, Pool, PoolConfiguration};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== esox_slotpool - Async Examples ===\n");

    // Example 1: Async claim
    async_claim().await;

    // Example 2: Async claim with timeout
    async_with_timeout().await;

    // Example 3: Concurrent tasks
    concurrent_access().await;
}

async fn async_claim() {
    println!("1. Async Claim:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(7))).with_size(3)).unwrap();
    pool.warmup_async(3).await.unwrap();

    {
        let obj = pool.claim_async(Duration::from_secs(1)).await.unwrap();
        println!("   Claimed asynchronously: {}", *obj);
    }

    println!();
}

async fn async_with_timeout() {
    println!("2. Async with Timeout:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(|_| Ok(42)))).unwrap();

    let _obj = pool.try_claim().unwrap();

    match pool.claim_async(Duration::from_millis(100)).await {
        Ok(_) => println!("   Claimed"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");
    let pool = Pool::new(PoolConfiguration::new(allocator_fn(slot_index)).with_size(2)).unwrap();

    let mut handles = Vec::new();
    for task in 0..5 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let obj = pool.claim_async(Duration::from_secs(5)).await.unwrap();
            println!("   Task {} got slot object {}", task, *obj);
            sleep(Duration::from_millis(20)).await;
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let completion = pool.shutdown();
    println!("   Shut down: {}", completion.wait_async(Duration::from_secs(1)).await.unwrap());
}

fn slot_index(ctx: &esox_slotpool::SlotContext) -> Result<usize, esox_slotpool::BoxError> {
    Ok(ctx.slot.index())
}
