//! User-initiated transfers from the logged-in wallet.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use ww_assets::BalanceCache;
use ww_core::error::{ChainError, ValidationError};
use ww_core::traits::{ChainClient, Signer};
use ww_core::{Address, Amount, Asset, GasPolicy, GasSpeed, TransactionRequest, TxHash};

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    /// Decimal amount in whole units of `asset`.
    pub amount: String,
    /// Symbol of a tracked asset.
    pub asset: String,
    #[serde(default)]
    pub speed: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub amount: String,
    pub asset: String,
    pub speed: GasSpeed,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error("chain unavailable: {0}")] Network(ChainError),
    #[error("submission failed: {0}")] Submit(ChainError),
    #[error("transaction {0} reverted")] Reverted(TxHash),
    #[error("transaction {0} not confirmed in time")] ConfirmationTimeout(TxHash),
}

pub struct SendFlow {
    chain: Arc<dyn ChainClient>,
    cache: Arc<BalanceCache>,
    gas: GasPolicy,
    assets: Vec<Asset>,
    confirmation_timeout: Duration,
}

impl SendFlow {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        cache: Arc<BalanceCache>,
        gas: GasPolicy,
        assets: Vec<Asset>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            gas,
            assets,
            confirmation_timeout,
        }
    }

    fn asset(&self, symbol: &str) -> Result<&Asset, ValidationError> {
        self.assets
            .iter()
            .find(|a| a.symbol().eq_ignore_ascii_case(symbol.trim()))
            .ok_or_else(|| ValidationError::UnknownAsset(symbol.to_string()))
    }

    /// Validate, price, sign and confirm one transfer.
    pub async fn send(&self, signer: &dyn Signer, req: &SendRequest) -> Result<SendReceipt, SendError> {
        let to = Address::parse(&req.to)?;
        let asset = self.asset(&req.asset)?;
        let amount = Amount::parse(&req.amount, asset.decimals())?;
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount.into());
        }
        let speed = match req.speed.as_deref() {
            Some(s) => s.parse::<GasSpeed>()?,
            None => GasSpeed::default(),
        };

        let base = self.chain.gas_price().await.map_err(SendError::Network)?;
        let from = signer.address();
        let request = TransactionRequest::transfer(asset, to, amount)
            .with_from(from)
            .with_gas_price(self.gas.adjust(base, speed));

        let tx_hash = signer
            .send_transaction(request)
            .await
            .map_err(SendError::Submit)?;
        info!(%from, %to, %amount, asset = asset.symbol(), %speed, %tx_hash, "transfer submitted");

        let confirmed = self.chain.wait_for_confirmation(&tx_hash, self.confirmation_timeout).await;
        self.cache.invalidate(&from);

        let receipt = match confirmed {
            Ok(receipt) => receipt,
            Err(ChainError::ConfirmationTimeout { .. }) => {
                warn!(%tx_hash, "transfer not confirmed in time");
                return Err(SendError::ConfirmationTimeout(tx_hash));
            }
            Err(e) => return Err(SendError::Network(e)),
        };
        if !receipt.success {
            warn!(%tx_hash, "transfer reverted");
            return Err(SendError::Reverted(tx_hash));
        }

        Ok(SendReceipt {
            tx_hash,
            block_number: receipt.block_number,
            from,
            to,
            amount: amount.to_string(),
            asset: asset.symbol().to_string(),
            speed,
        })
    }
}
