//! Collaborator interfaces.
//!
//! The dashboard core never talks to the network directly. These traits are
//! the seams to the outside world:
//! - [`ChainClient`]: balance reads, gas price, receipts (ww-rpc implements over JSON-RPC)
//! - [`Signer`]: submits transactions from one account (node-managed or embedded wallet)
//! - [`PriceFeed`]: batch USD prices
//! - [`PriceStore`]: last good quotes kept across restarts
//! - [`ChatClient`]: hosted LLM chat completion
//! - [`IdentityProvider`]: who is logged in and which signer acts for them

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::amount::Amount;
use crate::error::{ChainError, StorageError, UpstreamError};
use crate::types::{ChatMessage, PriceEntry, Receipt, TokenBalance, TransactionRequest, TxHash};

/// Read access to the target chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native currency balance of `address`.
    async fn native_balance(&self, address: &Address) -> Result<Amount, ChainError>;

    /// ERC-20 balance of `address` in the token at `contract`.
    async fn token_balance(
        &self,
        address: &Address,
        contract: &Address,
    ) -> Result<TokenBalance, ChainError>;

    /// Current network gas price in wei.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Receipt for `hash`, or `None` while the transaction is pending.
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError>;

    /// Wait until `hash` is mined, giving up after `timeout` with
    /// [`ChainError::ConfirmationTimeout`].
    async fn wait_for_confirmation(
        &self,
        hash: &TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ChainError>;
}

/// An account able to sign and broadcast transactions.
///
/// Variants are chosen once, when the active wallet is established.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address transactions are sent from.
    fn address(&self) -> Address;

    /// Short label for logs ("node", "embedded", ...).
    fn kind(&self) -> &'static str;

    /// Sign and broadcast `request`, returning its hash.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError>;
}

/// Market data source.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// USD prices for upper-case `symbols`. Symbols the feed does not know are
    /// omitted from the result rather than reported as errors.
    async fn batch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, UpstreamError>;
}

/// Durable copy of fetched quotes, read once at startup so the stale-price
/// fallback outlives the process.
pub trait PriceStore: Send + Sync {
    fn load_prices(&self) -> Result<Vec<PriceEntry>, StorageError>;

    /// Insert or replace the entries for each symbol in `entries`.
    fn save_prices(&self, entries: &[PriceEntry]) -> Result<(), StorageError>;
}

/// Hosted chat completion.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, UpstreamError>;
}

/// The identity provider's view of the current user.
pub trait IdentityProvider: Send + Sync {
    /// Start a session for the account behind `signer`, replacing any
    /// previous one. Returns the logged-in address.
    fn login(&self, signer: Arc<dyn Signer>) -> Address;

    /// Address of the logged-in user, if any.
    fn current_address(&self) -> Option<Address>;

    /// Signer acting for the logged-in user.
    fn active_signer(&self) -> Option<Arc<dyn Signer>>;

    /// End the session.
    fn logout(&self);
}
