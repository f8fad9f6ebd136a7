//! Balance cache, refresh scheduler and price annotation working together.

use std::sync::Arc;
use std::time::Duration;

use ww_assets::{
    calculate_usd_value, BalanceCache, BalanceCacheConfig, BalanceRefreshScheduler, FetchSource,
    PriceAnnotator, PriceCacheConfig, QuoteSource, SchedulerConfig,
};
use ww_core::ManualClock;
use ww_tests::helpers::*;

fn cache_with(chain: Arc<FakeChain>, clock: &ManualClock) -> Arc<BalanceCache> {
    Arc::new(BalanceCache::new(
        BalanceCacheConfig::default(),
        chain,
        Arc::new(clock.clone()),
    ))
}

#[tokio::test]
async fn reads_within_ttl_hit_chain_once() {
    let chain = Arc::new(FakeChain::new());
    let clock = ManualClock::at_epoch();
    let cache = cache_with(chain.clone(), &clock);

    let first = cache.get(addr(1), false).await;
    clock.advance(chrono::Duration::seconds(5));
    let second = cache.get(addr(1), false).await;

    assert_eq!(first.source, FetchSource::Refreshed);
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(chain.native_calls(), 1);
    assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
}

#[tokio::test]
async fn upstream_failure_serves_previous_snapshot() {
    let chain = Arc::new(FakeChain::new());
    let clock = ManualClock::at_epoch();
    let cache = cache_with(chain.clone(), &clock);

    let good = cache.get(addr(1), false).await;
    chain.set_balances_failing(true);
    let forced = cache.get(addr(1), true).await;

    assert_eq!(forced.source, FetchSource::Stale);
    assert_eq!(forced.snapshot, good.snapshot);
    assert!(forced.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_refresh() {
    let chain = Arc::new(FakeChain::new());
    chain.set_balance_delay(Duration::from_millis(500));
    let clock = ManualClock::at_epoch();
    let cache = cache_with(chain.clone(), &clock);

    let (a, b, c, d) = tokio::join!(
        cache.get(addr(1), false),
        cache.get(addr(1), false),
        cache.get(addr(1), true),
        cache.get(addr(1), false),
    );

    assert_eq!(chain.native_calls(), 1);
    for other in [&b, &c, &d] {
        assert_eq!(other.snapshot, a.snapshot);
    }
}

#[tokio::test]
async fn captured_at_strictly_increases() {
    let chain = Arc::new(FakeChain::new());
    let clock = ManualClock::at_epoch();
    let cache = cache_with(chain, &clock);

    let mut previous = cache.get(addr(1), true).await.snapshot.captured_at;
    for _ in 0..5 {
        let next = cache.get(addr(1), true).await.snapshot.captured_at;
        assert!(next > previous);
        previous = next;
    }
}

#[tokio::test(start_paused = true)]
async fn scheduler_refreshes_until_dropped() {
    let chain = Arc::new(FakeChain::new());
    let clock = ManualClock::at_epoch();
    let config = BalanceCacheConfig {
        ttl: chrono::Duration::zero(),
        ..BalanceCacheConfig::default()
    };
    let cache = Arc::new(BalanceCache::new(config, chain.clone(), Arc::new(clock)));

    let scheduler = BalanceRefreshScheduler::spawn(cache, SchedulerConfig::default(), Some(addr(1)));
    let mut updates = scheduler.subscribe();
    updates.changed().await.unwrap();
    updates.changed().await.unwrap();
    assert_eq!(chain.native_calls(), 2);

    drop(scheduler);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(chain.native_calls(), 2);
}

#[tokio::test]
async fn annotation_degrades_to_default_prices() {
    let chain = Arc::new(FakeChain::new());
    let clock = ManualClock::at_epoch();
    let cache = cache_with(chain, &clock);
    let feed = Arc::new(FakePriceFeed::with(&[]));
    feed.set_failing(true);
    let prices = PriceAnnotator::new(PriceCacheConfig::default(), feed.clone(), Arc::new(clock));

    let fetch = cache.get(addr(1), false).await;
    let annotated = prices.annotate(&fetch.snapshot).await;

    // 1 ETH at the 3100 fallback price
    assert_eq!(annotated.balances["ETH"].usd_value.as_deref(), Some("3100.00"));
    let quotes = prices.prices_for(&["ETH".to_string()]).await;
    assert_eq!(quotes["ETH"].source, QuoteSource::Default);
    assert_eq!(feed.calls(), 2);
}

#[test]
fn usd_value_examples() {
    assert_eq!(calculate_usd_value("10", 3.5), "35.00");
    assert_eq!(calculate_usd_value("abc", 3.5), "0.00");
}
