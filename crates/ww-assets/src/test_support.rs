use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ww_core::error::{ChainError, StorageError, UpstreamError};
use ww_core::traits::{ChainClient, PriceFeed, PriceStore};
use ww_core::{Address, Amount, PriceEntry, Receipt, TokenBalance, TxHash};

pub fn wallet(seed: u8) -> Address {
    Address::from_bytes([seed; 20])
}

/// 1.5 ETH and 250 of every token.
pub struct StubChain {
    native: AtomicUsize,
    tokens: AtomicUsize,
    failing: AtomicBool,
}

impl StubChain {
    pub fn new() -> Self {
        Self {
            native: AtomicUsize::new(0),
            tokens: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn native_calls(&self) -> usize {
        self.native.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.tokens.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ChainError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ChainError::Rpc("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn native_balance(&self, _: &Address) -> Result<Amount, ChainError> {
        self.native.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Amount::new(1_500_000_000_000_000_000, 18))
    }

    async fn token_balance(&self, _: &Address, contract: &Address) -> Result<TokenBalance, ChainError> {
        self.tokens.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let usdc = Address::parse(ww_core::constants::USDC_CONTRACT).unwrap();
        let (units, decimals, symbol) = if *contract == usdc {
            (250_000_000, 6, "USDC")
        } else {
            (250 * 10u128.pow(18), 18, "TOBY")
        };
        Ok(TokenBalance {
            balance: Amount::new(units, decimals),
            symbol: symbol.into(),
        })
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(1_000_000_000)
    }

    async fn transaction_receipt(&self, _: &TxHash) -> Result<Option<Receipt>, ChainError> {
        Ok(None)
    }

    async fn wait_for_confirmation(&self, hash: &TxHash, _: Duration) -> Result<Receipt, ChainError> {
        Ok(Receipt {
            tx_hash: *hash,
            block_number: 1,
            success: true,
        })
    }
}

pub struct StubFeed {
    prices: Mutex<HashMap<String, f64>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl StubFeed {
    pub fn with(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: Mutex::new(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().insert(symbol.to_string(), price);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Vec<String> {
        self.requested.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PriceFeed for StubFeed {
    async fn batch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(symbols.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Unavailable("price api down".into()));
        }
        let prices = self.prices.lock();
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

#[derive(Default)]
pub struct StubPriceStore {
    entries: Mutex<HashMap<String, PriceEntry>>,
    failing: AtomicBool,
}

impl StubPriceStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<PriceEntry> {
        self.entries.lock().values().cloned().collect()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Backend("disk unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl PriceStore for StubPriceStore {
    fn load_prices(&self) -> Result<Vec<PriceEntry>, StorageError> {
        self.check()?;
        Ok(self.saved())
    }

    fn save_prices(&self, entries: &[PriceEntry]) -> Result<(), StorageError> {
        self.check()?;
        let mut stored = self.entries.lock();
        for entry in entries {
            stored.insert(entry.symbol.clone(), entry.clone());
        }
        Ok(())
    }
}
