//! Per-wallet balance snapshots.
//!
//! A snapshot is served from memory while it is younger than the TTL. Older
//! or forced reads query the chain for every tracked asset in parallel. When
//! the chain is unreachable the previous snapshot is returned as-is, however
//! old, so the dashboard keeps showing the last known balances.
//!
//! Each wallet has one refresh lock. A caller that queued behind a refresh
//! which completed while it waited is handed that refresh's outcome instead
//! of issuing another round of RPC calls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use ww_core::constants::{
    BALANCE_CACHE_TTL_SECS, NATIVE_DECIMALS, NATIVE_SYMBOL, TOBY_CONTRACT, TOBY_DECIMALS,
    USDC_CONTRACT, USDC_DECIMALS,
};
use ww_core::error::ChainError;
use ww_core::traits::ChainClient;
use ww_core::{Address, Amount, Asset, Clock};

#[derive(Clone, Debug)]
pub struct BalanceCacheConfig {
    /// How long a snapshot is served without touching the chain.
    pub ttl: Duration,
    /// Assets queried on every refresh. Keyed by symbol in snapshots.
    pub assets: Vec<Asset>,
}

impl Default for BalanceCacheConfig {
    fn default() -> Self {
        let mut assets = vec![Asset::native(NATIVE_SYMBOL, NATIVE_DECIMALS)];
        if let Ok(usdc) = Address::parse(USDC_CONTRACT) {
            assets.push(Asset::token("USDC", usdc, USDC_DECIMALS));
        }
        if let Ok(toby) = Address::parse(TOBY_CONTRACT) {
            assets.push(Asset::token("TOBY", toby, TOBY_DECIMALS));
        }
        Self {
            ttl: Duration::seconds(BALANCE_CACHE_TTL_SECS as i64),
            assets,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetBalance {
    /// Decimal string in whole units, e.g. `"0.0005"`.
    pub raw_balance: String,
    /// USD value with two decimals, filled in by the price annotator.
    pub usd_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub wallet: Address,
    pub balances: BTreeMap<String, AssetBalance>,
    pub captured_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    fn empty(wallet: Address, at: DateTime<Utc>) -> Self {
        Self {
            wallet,
            balances: BTreeMap::new(),
            captured_at: at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

/// Where a [`BalanceFetch`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    /// Fresh snapshot from memory, no chain I/O.
    Cache,
    /// A refresh succeeded just now.
    Refreshed,
    /// The refresh failed; this is the last good snapshot.
    Stale,
    /// The refresh failed and nothing was cached yet.
    Empty,
}

#[derive(Clone, Debug)]
pub struct BalanceFetch {
    pub snapshot: Arc<BalanceSnapshot>,
    pub source: FetchSource,
    /// Set when the refresh behind this fetch failed. Recoverable.
    pub error: Option<ChainError>,
}

#[derive(Default)]
struct SlotState {
    snapshot: Option<Arc<BalanceSnapshot>>,
    /// Cleared by [`BalanceCache::invalidate`] so the next read refreshes.
    fresh_until: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct WalletSlot {
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after each completed refresh.
    generation: AtomicU64,
    state: Mutex<SlotState>,
    last_outcome: Mutex<Option<BalanceFetch>>,
}

pub struct BalanceCache {
    config: BalanceCacheConfig,
    chain: Arc<dyn ChainClient>,
    clock: Arc<dyn Clock>,
    slots: DashMap<Address, Arc<WalletSlot>>,
}

impl BalanceCache {
    pub fn new(config: BalanceCacheConfig, chain: Arc<dyn ChainClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            chain,
            clock,
            slots: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BalanceCacheConfig {
        &self.config
    }

    fn slot(&self, wallet: Address) -> Arc<WalletSlot> {
        self.slots.entry(wallet).or_default().clone()
    }

    /// Balances of `wallet`, refreshing from the chain when stale or forced.
    ///
    /// Never fails: upstream errors are reported through
    /// [`BalanceFetch::error`] alongside the best snapshot available.
    pub async fn get(&self, wallet: Address, force: bool) -> BalanceFetch {
        let slot = self.slot(wallet);

        if !force {
            if let Some(snapshot) = self.fresh_snapshot(&slot) {
                return BalanceFetch {
                    snapshot,
                    source: FetchSource::Cache,
                    error: None,
                };
            }
        }

        let seen = slot.generation.load(Ordering::Acquire);
        let _guard = slot.refresh_lock.lock().await;
        if slot.generation.load(Ordering::Acquire) != seen {
            if let Some(outcome) = slot.last_outcome.lock().clone() {
                debug!(%wallet, "joined in-flight balance refresh");
                return outcome;
            }
        }

        let outcome = self.refresh(wallet, &slot).await;
        *slot.last_outcome.lock() = Some(outcome.clone());
        slot.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Mark the cached snapshot of `wallet` as expired. It is kept as the
    /// stale fallback.
    pub fn invalidate(&self, wallet: &Address) {
        if let Some(slot) = self.slots.get(wallet) {
            slot.state.lock().fresh_until = None;
        }
    }

    /// Last published snapshot, fresh or not.
    pub fn peek(&self, wallet: &Address) -> Option<Arc<BalanceSnapshot>> {
        self.slots.get(wallet)?.state.lock().snapshot.clone()
    }

    fn fresh_snapshot(&self, slot: &WalletSlot) -> Option<Arc<BalanceSnapshot>> {
        let state = slot.state.lock();
        match (&state.snapshot, state.fresh_until) {
            (Some(snapshot), Some(until)) if self.clock.now() < until => Some(snapshot.clone()),
            _ => None,
        }
    }

    async fn refresh(&self, wallet: Address, slot: &WalletSlot) -> BalanceFetch {
        match self.query_all(wallet).await {
            Ok(balances) => {
                let mut state = slot.state.lock();
                let now = self.clock.now();
                let captured_at = match &state.snapshot {
                    Some(prev) if prev.captured_at >= now => prev.captured_at + Duration::milliseconds(1),
                    _ => now,
                };
                let snapshot = Arc::new(BalanceSnapshot {
                    wallet,
                    balances,
                    captured_at,
                });
                state.snapshot = Some(snapshot.clone());
                state.fresh_until = Some(captured_at + self.config.ttl);
                debug!(%wallet, assets = snapshot.balances.len(), "balance snapshot refreshed");
                BalanceFetch {
                    snapshot,
                    source: FetchSource::Refreshed,
                    error: None,
                }
            }
            Err(e) => {
                warn!(%wallet, error = %e, "balance refresh failed");
                match slot.state.lock().snapshot.clone() {
                    Some(previous) => BalanceFetch {
                        snapshot: previous,
                        source: FetchSource::Stale,
                        error: Some(e),
                    },
                    None => BalanceFetch {
                        snapshot: Arc::new(BalanceSnapshot::empty(wallet, self.clock.now())),
                        source: FetchSource::Empty,
                        error: Some(e),
                    },
                }
            }
        }
    }

    /// Query every tracked asset concurrently. Any failure fails the whole
    /// refresh so snapshots are never partial.
    async fn query_all(&self, wallet: Address) -> Result<BTreeMap<String, AssetBalance>, ChainError> {
        let mut set = JoinSet::new();
        for asset in &self.config.assets {
            let chain = self.chain.clone();
            let asset = asset.clone();
            set.spawn(async move {
                let balance: Result<Amount, ChainError> = match &asset {
                    Asset::Native { .. } => chain.native_balance(&wallet).await,
                    Asset::Token { contract, .. } => chain
                        .token_balance(&wallet, contract)
                        .await
                        .map(|token| token.balance),
                };
                (asset.symbol().to_string(), balance)
            });
        }

        let mut balances = BTreeMap::new();
        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((symbol, Ok(amount))) => {
                    balances.insert(
                        symbol,
                        AssetBalance {
                            raw_balance: amount.to_string(),
                            usd_value: None,
                        },
                    );
                }
                Ok((symbol, Err(e))) => {
                    debug!(%wallet, %symbol, error = %e, "asset balance query failed");
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(ChainError::Rpc(format!("balance task failed: {e}")));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(balances),
        }
    }
}
