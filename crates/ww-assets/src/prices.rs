//! USD price lookup and balance annotation.
//!
//! Prices are cached per symbol for `ttl`. A lookup sends one batch request
//! for every symbol that is missing or stale; symbols the feed cannot price
//! fall back to the stale cache entry, then to a static table. With a
//! [`PriceStore`] attached, fetched quotes are persisted and reloaded on
//! startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use ww_core::constants::{DEFAULT_PRICES_USD, PRICE_CACHE_TTL_SECS};
use ww_core::traits::{PriceFeed, PriceStore};
use ww_core::Clock;
pub use ww_core::PriceEntry;

use crate::balance_cache::BalanceSnapshot;

#[derive(Clone, Debug)]
pub struct PriceCacheConfig {
    pub ttl: Duration,
    /// Last-resort prices by upper-case symbol. Unknown symbols price at 0.
    pub defaults: HashMap<String, f64>,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(PRICE_CACHE_TTL_SECS as i64),
            defaults: DEFAULT_PRICES_USD
                .iter()
                .map(|(symbol, price)| (symbol.to_string(), *price))
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    /// Cached and within TTL.
    Fresh,
    /// Fetched from the feed by this lookup.
    Fetched,
    /// Expired cache entry used because the feed failed.
    Stale,
    /// Static fallback table.
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub source: QuoteSource,
}

/// `balance × price` rendered with two decimals. Unparseable balances are
/// worth `"0.00"`.
pub fn calculate_usd_value(balance: &str, price: f64) -> String {
    let value = match balance.trim().parse::<f64>() {
        Ok(b) => b * price,
        Err(_) => 0.0,
    };
    if value.is_finite() {
        format!("{value:.2}")
    } else {
        "0.00".to_string()
    }
}

pub struct PriceAnnotator {
    config: PriceCacheConfig,
    feed: Arc<dyn PriceFeed>,
    clock: Arc<dyn Clock>,
    cache: DashMap<String, PriceEntry>,
    store: Option<Arc<dyn PriceStore>>,
}

impl PriceAnnotator {
    pub fn new(config: PriceCacheConfig, feed: Arc<dyn PriceFeed>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            feed,
            clock,
            cache: DashMap::new(),
            store: None,
        }
    }

    /// Seed the cache from `store` and persist every future fetch to it.
    /// A store that cannot be read starts the cache empty.
    pub fn with_store(mut self, store: Arc<dyn PriceStore>) -> Self {
        match store.load_prices() {
            Ok(entries) => {
                debug!(count = entries.len(), "loaded persisted prices");
                for entry in entries {
                    self.cache.insert(entry.symbol.to_uppercase(), entry);
                }
            }
            Err(e) => warn!(error = %e, "persisted prices unreadable; starting empty"),
        }
        self.store = Some(store);
        self
    }

    /// Quote every symbol in `symbols`. Never fails; see [`QuoteSource`].
    pub async fn prices_for(&self, symbols: &[String]) -> BTreeMap<String, PriceQuote> {
        let now = self.clock.now();
        let mut quotes = BTreeMap::new();
        let mut to_fetch: Vec<String> = Vec::new();

        for symbol in symbols.iter().map(|s| s.trim().to_uppercase()) {
            if symbol.is_empty() || quotes.contains_key(&symbol) || to_fetch.contains(&symbol) {
                continue;
            }
            let fresh = self
                .cache
                .get(&symbol)
                .filter(|entry| entry.is_fresh(now, self.config.ttl))
                .map(|entry| entry.price_usd);
            match fresh {
                Some(price_usd) => {
                    quotes.insert(
                        symbol,
                        PriceQuote {
                            price_usd,
                            source: QuoteSource::Fresh,
                        },
                    );
                }
                None => to_fetch.push(symbol),
            }
        }

        if to_fetch.is_empty() {
            return quotes;
        }

        let fetched = match self.feed.batch_prices(&to_fetch).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(symbols = ?to_fetch, error = %e, "price feed failed; using fallback prices");
                HashMap::new()
            }
        };
        let fetched_at = self.clock.now();
        let mut persisted = Vec::new();

        for symbol in to_fetch {
            let quote = match fetched.get(&symbol).copied() {
                Some(price_usd) if price_usd.is_finite() && price_usd >= 0.0 => {
                    let entry = PriceEntry {
                        symbol: symbol.clone(),
                        price_usd,
                        fetched_at,
                    };
                    self.cache.insert(symbol.clone(), entry.clone());
                    persisted.push(entry);
                    PriceQuote {
                        price_usd,
                        source: QuoteSource::Fetched,
                    }
                }
                _ => self.fallback(&symbol),
            };
            quotes.insert(symbol, quote);
        }

        if let Some(store) = self.store.as_ref().filter(|_| !persisted.is_empty()) {
            if let Err(e) = store.save_prices(&persisted) {
                warn!(error = %e, "failed to persist prices");
            }
        }
        quotes
    }

    fn fallback(&self, symbol: &str) -> PriceQuote {
        if let Some(entry) = self.cache.get(symbol) {
            debug!(%symbol, fetched_at = %entry.fetched_at, "serving stale price");
            return PriceQuote {
                price_usd: entry.price_usd,
                source: QuoteSource::Stale,
            };
        }
        PriceQuote {
            price_usd: self.config.defaults.get(symbol).copied().unwrap_or(0.0),
            source: QuoteSource::Default,
        }
    }

    /// Copy of `snapshot` with every `usd_value` filled in.
    pub async fn annotate(&self, snapshot: &BalanceSnapshot) -> BalanceSnapshot {
        let symbols: Vec<String> = snapshot.balances.keys().cloned().collect();
        let quotes = self.prices_for(&symbols).await;

        let mut annotated = snapshot.clone();
        for (symbol, balance) in annotated.balances.iter_mut() {
            let price = quotes.get(symbol).map_or(0.0, |q| q.price_usd);
            balance.usd_value = Some(calculate_usd_value(&balance.raw_balance, price));
        }
        annotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance_cache::AssetBalance;
    use crate::test_support::{wallet, StubFeed, StubPriceStore};
    use ww_core::ManualClock;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn annotator(feed: Arc<StubFeed>, clock: &ManualClock) -> PriceAnnotator {
        PriceAnnotator::new(PriceCacheConfig::default(), feed, Arc::new(clock.clone()))
    }

    #[test]
    fn usd_value_two_decimals() {
        assert_eq!(calculate_usd_value("10", 3.5), "35.00");
        assert_eq!(calculate_usd_value("0.0005", 3100.0), "1.55");
        assert_eq!(calculate_usd_value("abc", 3.5), "0.00");
        assert_eq!(calculate_usd_value("", 3.5), "0.00");
    }

    #[tokio::test]
    async fn fetches_then_serves_from_cache() {
        let feed = Arc::new(StubFeed::with(&[("ETH", 3200.0), ("USDC", 1.0)]));
        let clock = ManualClock::at_epoch();
        let prices = annotator(feed.clone(), &clock);

        let first = prices.prices_for(&symbols(&["eth", "USDC"])).await;
        assert_eq!(first["ETH"].source, QuoteSource::Fetched);
        assert_eq!(first["ETH"].price_usd, 3200.0);

        clock.advance(Duration::seconds(60));
        let second = prices.prices_for(&symbols(&["ETH"])).await;
        assert_eq!(second["ETH"].source, QuoteSource::Fresh);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn only_stale_and_missing_symbols_are_requested() {
        let feed = Arc::new(StubFeed::with(&[("ETH", 3200.0), ("USDC", 1.0)]));
        let clock = ManualClock::at_epoch();
        let prices = annotator(feed.clone(), &clock);

        prices.prices_for(&symbols(&["ETH"])).await;
        prices.prices_for(&symbols(&["ETH", "USDC"])).await;
        assert_eq!(feed.last_request(), symbols(&["USDC"]));
    }

    #[tokio::test]
    async fn expired_entry_refetched() {
        let feed = Arc::new(StubFeed::with(&[("ETH", 3200.0)]));
        let clock = ManualClock::at_epoch();
        let prices = annotator(feed.clone(), &clock);

        prices.prices_for(&symbols(&["ETH"])).await;
        feed.set_price("ETH", 3300.0);
        clock.advance(Duration::seconds(300));
        let quote = prices.prices_for(&symbols(&["ETH"])).await;
        assert_eq!(quote["ETH"].price_usd, 3300.0);
        assert_eq!(quote["ETH"].source, QuoteSource::Fetched);
    }

    #[tokio::test]
    async fn feed_failure_prefers_stale_then_default() {
        let feed = Arc::new(StubFeed::with(&[("ETH", 3200.0)]));
        let clock = ManualClock::at_epoch();
        let prices = annotator(feed.clone(), &clock);

        prices.prices_for(&symbols(&["ETH"])).await;
        clock.advance(Duration::hours(1));
        feed.set_failing(true);

        let quotes = prices.prices_for(&symbols(&["ETH", "TOBY", "DOGE"])).await;
        assert_eq!(quotes["ETH"], PriceQuote { price_usd: 3200.0, source: QuoteSource::Stale });
        assert_eq!(quotes["TOBY"], PriceQuote { price_usd: 0.001, source: QuoteSource::Default });
        assert_eq!(quotes["DOGE"].price_usd, 0.0);
    }

    #[tokio::test]
    async fn symbol_missing_from_response_uses_default() {
        let feed = Arc::new(StubFeed::with(&[]));
        let clock = ManualClock::at_epoch();
        let quotes = annotator(feed, &clock).prices_for(&symbols(&["BTC"])).await;
        assert_eq!(quotes["BTC"], PriceQuote { price_usd: 62000.0, source: QuoteSource::Default });
    }

    #[tokio::test]
    async fn persisted_prices_survive_restart_as_stale_fallback() {
        let store = Arc::new(StubPriceStore::default());
        let clock = ManualClock::at_epoch();

        let feed = Arc::new(StubFeed::with(&[("ETH", 3200.0)]));
        annotator(feed, &clock)
            .with_store(store.clone())
            .prices_for(&symbols(&["ETH"]))
            .await;
        assert_eq!(store.saved().len(), 1);

        clock.advance(Duration::hours(2));
        let down = Arc::new(StubFeed::with(&[]));
        down.set_failing(true);
        let restarted = annotator(down, &clock).with_store(store.clone());
        let quotes = restarted.prices_for(&symbols(&["ETH", "BTC"])).await;
        assert_eq!(quotes["ETH"], PriceQuote { price_usd: 3200.0, source: QuoteSource::Stale });
        assert_eq!(quotes["BTC"].source, QuoteSource::Default);
    }

    #[tokio::test]
    async fn fresh_persisted_price_skips_the_feed() {
        let store = Arc::new(StubPriceStore::default());
        let clock = ManualClock::at_epoch();
        store.save_prices(&[PriceEntry {
            symbol: "USDC".into(),
            price_usd: 1.0,
            fetched_at: clock.now(),
        }])
        .unwrap();

        let feed = Arc::new(StubFeed::with(&[]));
        let quotes = annotator(feed.clone(), &clock)
            .with_store(store)
            .prices_for(&symbols(&["USDC"]))
            .await;
        assert_eq!(quotes["USDC"].source, QuoteSource::Fresh);
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn unreadable_store_starts_empty() {
        let store = Arc::new(StubPriceStore::default());
        store.set_failing(true);
        let clock = ManualClock::at_epoch();
        let feed = Arc::new(StubFeed::with(&[("ETH", 3000.0)]));
        let quotes = annotator(feed, &clock)
            .with_store(store)
            .prices_for(&symbols(&["ETH"]))
            .await;
        assert_eq!(quotes["ETH"].source, QuoteSource::Fetched);
    }

    #[tokio::test]
    async fn annotate_fills_usd_values() {
        let feed = Arc::new(StubFeed::with(&[("ETH", 3000.0), ("USDC", 1.0)]));
        let clock = ManualClock::at_epoch();
        let mut snapshot = BalanceSnapshot {
            wallet: wallet(1),
            balances: BTreeMap::new(),
            captured_at: clock.now(),
        };
        for (symbol, raw) in [("ETH", "1.5"), ("USDC", "250.0")] {
            snapshot.balances.insert(
                symbol.to_string(),
                AssetBalance {
                    raw_balance: raw.to_string(),
                    usd_value: None,
                },
            );
        }

        let annotated = annotator(feed, &clock).annotate(&snapshot).await;
        assert_eq!(annotated.balances["ETH"].usd_value.as_deref(), Some("4500.00"));
        assert_eq!(annotated.balances["USDC"].usd_value.as_deref(), Some("250.00"));
        assert_eq!(annotated.captured_at, snapshot.captured_at);
        assert!(snapshot.balances["ETH"].usd_value.is_none());
    }
}
