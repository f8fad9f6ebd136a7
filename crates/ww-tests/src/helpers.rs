//! Shared fakes for scenario and route tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ww_core::constants::{NATIVE_DECIMALS, WEI_PER_ETH};
use ww_core::error::{ChainError, StorageError, UpstreamError};
use ww_core::traits::{ChainClient, ChatClient, PriceFeed, Signer};
use ww_core::{
    Address, Amount, ChatMessage, Clock, ManualClock, Receipt, TokenBalance, TransactionRequest,
    TxHash,
};
use ww_faucet::{
    ClaimRecord, CounterStore, DistributionLedger, FaucetDispenser, FaucetKind, FaucetPolicyConfig,
};

/// Deterministic address from a seed byte.
pub fn addr(seed: u8) -> Address {
    Address::from_bytes([seed; 20])
}

/// Hex form of [`addr`], as an API client would send it.
pub fn addr_str(seed: u8) -> String {
    addr(seed).to_hex()
}

/// How [`FakeChain::wait_for_confirmation`] resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    Timeout,
}

/// Scripted chain. Balances apply to every address.
pub struct FakeChain {
    native_wei: Mutex<u128>,
    token_units: Mutex<u128>,
    token_decimals: u8,
    gas_price: u128,
    receipt_mode: Mutex<ReceiptMode>,
    balances_failing: AtomicBool,
    gas_failing: AtomicBool,
    /// Delay inside every balance query, to hold a refresh in flight.
    balance_delay: Mutex<Duration>,
    confirmation_delay: Duration,
    native_calls: AtomicUsize,
    token_calls: AtomicUsize,
    confirmations: AtomicUsize,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            native_wei: Mutex::new(WEI_PER_ETH),
            token_units: Mutex::new(1_000_000 * 10u128.pow(18)),
            token_decimals: 18,
            gas_price: 1_000_000_000,
            receipt_mode: Mutex::new(ReceiptMode::Success),
            balances_failing: AtomicBool::new(false),
            gas_failing: AtomicBool::new(false),
            balance_delay: Mutex::new(Duration::ZERO),
            confirmation_delay: Duration::from_millis(10),
            native_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            confirmations: AtomicUsize::new(0),
        }
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native_wei(&self, wei: u128) {
        *self.native_wei.lock() = wei;
    }

    pub fn set_token_units(&self, units: u128) {
        *self.token_units.lock() = units;
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        *self.receipt_mode.lock() = mode;
    }

    pub fn set_balances_failing(&self, failing: bool) {
        self.balances_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_gas_failing(&self, failing: bool) {
        self.gas_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_balance_delay(&self, delay: Duration) {
        *self.balance_delay.lock() = delay;
    }

    pub fn native_calls(&self) -> usize {
        self.native_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }

    async fn balance_gate(&self) -> Result<(), ChainError> {
        let delay = *self.balance_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.balances_failing.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("node unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn native_balance(&self, _: &Address) -> Result<Amount, ChainError> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        self.balance_gate().await?;
        Ok(Amount::new(*self.native_wei.lock(), NATIVE_DECIMALS))
    }

    async fn token_balance(&self, _: &Address, _: &Address) -> Result<TokenBalance, ChainError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.balance_gate().await?;
        Ok(TokenBalance {
            balance: Amount::new(*self.token_units.lock(), self.token_decimals),
            symbol: "TOKEN".into(),
        })
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        if self.gas_failing.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("eth_gasPrice failed".into()));
        }
        Ok(self.gas_price)
    }

    async fn transaction_receipt(&self, _: &TxHash) -> Result<Option<Receipt>, ChainError> {
        Ok(None)
    }

    async fn wait_for_confirmation(&self, hash: &TxHash, timeout: Duration) -> Result<Receipt, ChainError> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.confirmation_delay).await;
        let mode = *self.receipt_mode.lock();
        match mode {
            ReceiptMode::Timeout => Err(ChainError::ConfirmationTimeout {
                tx_hash: hash.to_hex(),
                waited_secs: timeout.as_secs(),
            }),
            ReceiptMode::Success | ReceiptMode::Revert => Ok(Receipt {
                tx_hash: *hash,
                block_number: 100,
                success: mode == ReceiptMode::Success,
            }),
        }
    }
}

/// Records every transaction it is asked to send.
pub struct FakeSigner {
    address: Address,
    failing: AtomicBool,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl FakeSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainError::Signer("nonce too low".into()));
        }
        let mut sent = self.sent.lock();
        sent.push(request);
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&(sent.len() as u64).to_be_bytes());
        Ok(TxHash(hash))
    }
}

pub struct FakePriceFeed {
    prices: Mutex<HashMap<String, f64>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakePriceFeed {
    pub fn with(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: Mutex::new(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for FakePriceFeed {
    async fn batch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Unavailable("price feed down".into()));
        }
        let prices = self.prices.lock();
        Ok(symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }
}

/// Chat backend that echoes, or fails when constructed with `None`.
pub struct FakeChat {
    reply: Option<String>,
    last_history_len: Mutex<Option<usize>>,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            last_history_len: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            last_history_len: Mutex::new(None),
        }
    }

    pub fn last_history_len(&self) -> Option<usize> {
        *self.last_history_len.lock()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn complete(&self, _: &str, history: &[ChatMessage], _: &str) -> Result<String, UpstreamError> {
        *self.last_history_len.lock() = Some(history.len());
        self.reply
            .clone()
            .ok_or_else(|| UpstreamError::Unavailable("chat backend down".into()))
    }
}

/// Store whose backend is gone.
pub struct FailingStore;

impl CounterStore for FailingStore {
    fn ledger(&self, _: FaucetKind, _: u8) -> Result<DistributionLedger, StorageError> {
        Err(StorageError::Backend("disk unavailable".into()))
    }

    fn last_claim(&self, _: FaucetKind, _: &Address) -> Result<Option<ClaimRecord>, StorageError> {
        Err(StorageError::Backend("disk unavailable".into()))
    }

    fn commit_claim(&self, _: FaucetKind, _: &ClaimRecord, _: Amount) -> Result<DistributionLedger, StorageError> {
        Err(StorageError::Backend("disk unavailable".into()))
    }

    fn reset(&self, _: FaucetKind) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk unavailable".into()))
    }
}

/// Everything a faucet scenario needs, wired together.
pub struct FaucetHarness {
    pub dispenser: FaucetDispenser,
    pub chain: Arc<FakeChain>,
    pub funding: Arc<FakeSigner>,
    pub store: Arc<dyn CounterStore>,
    pub clock: ManualClock,
}

impl FaucetHarness {
    pub fn new(config: FaucetPolicyConfig, store: Arc<dyn CounterStore>) -> Self {
        let chain = Arc::new(FakeChain::new());
        let funding = Arc::new(FakeSigner::new(addr(0xfa)));
        let clock = ManualClock::at_epoch();
        let dispenser = FaucetDispenser::new(
            config,
            store.clone(),
            chain.clone(),
            Some(funding.clone() as Arc<dyn Signer>),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        );
        Self {
            dispenser,
            chain,
            funding,
            store,
            clock,
        }
    }

    pub fn ledger(&self) -> DistributionLedger {
        let config = self.dispenser.config();
        self.store
            .ledger(config.kind, config.asset.decimals())
            .unwrap_or_else(|e| panic!("ledger read failed: {e}"))
    }
}
