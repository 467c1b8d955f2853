//! Concurrency behaviour of region scopes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tollgate_core::Region;
use tollgate_limiter::{QuotaRule, RateLimiter};

fn saturated_rule() -> Vec<QuotaRule> {
    vec![QuotaRule::new(1, Duration::from_secs(10)).with_starting_count(1)]
}

#[tokio::test(start_paused = true)]
async fn test_saturated_region_does_not_block_other_regions() {
    let limiter = Arc::new(RateLimiter::new(
        "summoner",
        Duration::from_millis(50),
        Duration::ZERO,
        true,
    ));
    let busy = Region::new("na1");
    let idle = Region::new("euw1");
    limiter.reconfigure(&busy, saturated_rule()).await;
    limiter
        .reconfigure(&idle, vec![QuotaRule::new(100, Duration::from_secs(10))])
        .await;

    let start = Instant::now();
    let waiting = {
        let limiter = Arc::clone(&limiter);
        let busy = busy.clone();
        tokio::spawn(async move { limiter.acquire(&busy, true).await })
    };
    tokio::task::yield_now().await;

    // The busy region holds its lock for the whole wait; the idle one is free.
    assert_eq!(limiter.acquire(&idle, true).await, Duration::ZERO);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!waiting.is_finished());

    let waited = waiting.await.expect("task should not panic");
    assert_eq!(waited, Duration::from_millis(10_050));
}

#[tokio::test(start_paused = true)]
async fn test_serialized_callers_in_one_region_never_exceed_capacity() {
    let limiter = Arc::new(RateLimiter::new(
        "match",
        Duration::ZERO,
        Duration::ZERO,
        true,
    ));
    let region = Region::new("kr");
    limiter
        .reconfigure(&region, vec![QuotaRule::new(2, Duration::from_secs(10))])
        .await;

    let start = Instant::now();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let region = region.clone();
            tokio::spawn(async move {
                limiter.acquire(&region, true).await;
                start.elapsed()
            })
        })
        .collect();

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.expect("task should not panic"));
    }
    finished.sort();

    // Two calls per ten-second window.
    for (i, at) in finished.iter().enumerate() {
        let window = (i / 2) as u64;
        assert!(*at >= Duration::from_secs(10 * window));
    }
}
