//! # ww-assets: wallet balances and their USD values.
//!
//! - [`balance_cache`]: per-wallet snapshots with TTL, stale fallback and
//!   single-flight refresh
//! - [`scheduler`]: background task driving the cache for the active wallet
//! - [`prices`]: USD quotes with their own cache and a static fallback table

pub mod balance_cache;
pub mod prices;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use balance_cache::{
    AssetBalance, BalanceCache, BalanceCacheConfig, BalanceFetch, BalanceSnapshot, FetchSource,
};
pub use prices::{calculate_usd_value, PriceAnnotator, PriceCacheConfig, PriceEntry, PriceQuote, QuoteSource};
pub use scheduler::{BalanceRefreshScheduler, SchedulerConfig};
