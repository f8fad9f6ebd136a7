//! One faucet claim, end to end.
//!
//! Steps run strictly in order: validate the address, consult the rate-limit
//! policy, check the funding wallet, send the transfer and wait for it to be
//! mined, then commit the claim. The ledger is only written after
//! confirmation, so failed or unconfirmed transfers never count against the
//! recipient.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use ww_core::error::ChainError;
use ww_core::traits::{ChainClient, Signer};
use ww_core::{Address, Asset, Clock, GasPolicy, TransactionRequest, TxHash};

use crate::admin::AdminGrant;
use crate::config::{FaucetKind, FaucetPolicyConfig};
use crate::error::{DenyReason, FaucetError};
use crate::policy::{Decision, RateLimitPolicy};
use crate::store::{ClaimRecord, CounterStore};

/// Faucet state as shown to a (possibly anonymous) user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaucetStatus {
    pub faucet: FaucetKind,
    pub symbol: String,
    pub amount_per_claim: String,
    pub global_cap: String,
    pub total_distributed: String,
    pub recipients: usize,
    pub cooldown_secs: i64,
    /// Whether the queried recipient could claim right now.
    pub eligible: Option<bool>,
    pub deny_reason: Option<DenyReason>,
    pub retry_at: Option<DateTime<Utc>>,
}

pub struct FaucetDispenser {
    config: Arc<FaucetPolicyConfig>,
    policy: RateLimitPolicy,
    store: Arc<dyn CounterStore>,
    chain: Arc<dyn ChainClient>,
    /// Wallet paying out claims. `None` leaves the faucet visible but unable to dispense.
    funding: Option<Arc<dyn Signer>>,
    gas: GasPolicy,
    clock: Arc<dyn Clock>,
    /// Held from the policy check until the claim is committed.
    claim_lock: Mutex<()>,
}

impl FaucetDispenser {
    pub fn new(
        config: FaucetPolicyConfig,
        store: Arc<dyn CounterStore>,
        chain: Arc<dyn ChainClient>,
        funding: Option<Arc<dyn Signer>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            policy: RateLimitPolicy::new(config.clone(), store.clone()),
            config,
            store,
            chain,
            funding,
            gas: GasPolicy::default(),
            clock,
            claim_lock: Mutex::new(()),
        }
    }

    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    pub fn config(&self) -> &FaucetPolicyConfig {
        &self.config
    }

    pub fn kind(&self) -> FaucetKind {
        self.config.kind
    }

    /// Send `amount_per_claim` to `recipient` if policy and funding allow it.
    pub async fn dispense(&self, recipient: &str) -> Result<TxHash, FaucetError> {
        let faucet = self.config.kind;
        let recipient = Address::parse(recipient)?;

        let _guard = self.claim_lock.lock().await;

        let now = self.clock.now();
        if let Decision::Deny { reason, retry_at } = self.policy.evaluate(&recipient, now)? {
            info!(%faucet, %recipient, %reason, ?retry_at, "faucet claim denied");
            return Err(FaucetError::RateLimited { reason, retry_at });
        }

        let funding = self.funding.as_ref().ok_or_else(|| {
            FaucetError::FundingUnavailable("funding wallet not configured".into())
        })?;
        let gas_price = self.check_funding(funding.as_ref()).await?;

        info!(%faucet, %recipient, amount = %self.config.amount_per_claim, "faucet dispensing");

        let request = TransactionRequest::transfer(
            &self.config.asset,
            recipient,
            self.config.amount_per_claim,
        )
        .with_from(funding.address())
        .with_gas_price(self.gas.adjust(gas_price, self.config.gas_speed));

        let tx_hash = funding.send_transaction(request).await.map_err(|e| {
            warn!(%faucet, %recipient, error = %e, "faucet transfer submission failed");
            FaucetError::TransferFailed(e.to_string())
        })?;

        let receipt = match self
            .chain
            .wait_for_confirmation(&tx_hash, self.config.confirmation_timeout)
            .await
        {
            Ok(receipt) => receipt,
            Err(ChainError::ConfirmationTimeout { .. }) => {
                warn!(%faucet, %recipient, %tx_hash, "faucet transfer unconfirmed; ledger not updated");
                return Err(FaucetError::ConfirmationTimeout { tx_hash });
            }
            Err(e) => {
                warn!(%faucet, %recipient, %tx_hash, error = %e, "faucet confirmation failed");
                return Err(FaucetError::TransferFailed(e.to_string()));
            }
        };
        if !receipt.success {
            warn!(%faucet, %recipient, %tx_hash, "faucet transfer reverted");
            return Err(FaucetError::TransferFailed(format!("transaction {tx_hash} reverted")));
        }

        let claim = ClaimRecord {
            recipient,
            claimed_at: self.clock.now(),
        };
        let ledger = self
            .store
            .commit_claim(faucet, &claim, self.config.amount_per_claim)
            .map_err(|e| {
                error!(%faucet, %recipient, %tx_hash, error = %e, "transfer confirmed but claim not recorded");
                FaucetError::Storage(e)
            })?;

        info!(
            %faucet,
            %recipient,
            %tx_hash,
            block = receipt.block_number,
            total = %ledger.total_distributed,
            "faucet claim committed"
        );
        Ok(tx_hash)
    }

    /// Confirm the funding wallet covers the claim plus fees. Returns the
    /// network gas price used for the estimate.
    async fn check_funding(&self, funding: &dyn Signer) -> Result<u128, FaucetError> {
        let unavailable = |e: ChainError| FaucetError::FundingUnavailable(e.to_string());
        let from = funding.address();
        let amount = self.config.amount_per_claim;

        let gas_price = self.chain.gas_price().await.map_err(unavailable)?;
        let fee = self.gas.fee(
            gas_price,
            self.config.gas_speed,
            self.config.asset.transfer_gas_limit(),
        );
        let native = self.chain.native_balance(&from).await.map_err(unavailable)?;

        let native_needed = match &self.config.asset {
            Asset::Native { .. } => amount.units().saturating_add(fee),
            Asset::Token { contract, .. } => {
                let token = self
                    .chain
                    .token_balance(&from, contract)
                    .await
                    .map_err(unavailable)?;
                if token.balance.units() < amount.units() {
                    warn!(faucet = %self.config.kind, have = %token.balance, need = %amount, "faucet token balance too low");
                    return Err(FaucetError::FundingUnavailable(format!(
                        "token balance {} below claim amount {}",
                        token.balance, amount
                    )));
                }
                fee
            }
        };

        if native.units() < native_needed {
            warn!(faucet = %self.config.kind, have = %native.units(), need = %native_needed, "faucet native balance too low");
            return Err(FaucetError::FundingUnavailable(format!(
                "native balance {} wei below required {} wei",
                native.units(),
                native_needed
            )));
        }
        Ok(gas_price)
    }

    /// Ledger totals and, when `recipient` is given, whether it may claim now.
    pub fn status(&self, recipient: Option<&Address>) -> Result<FaucetStatus, FaucetError> {
        let ledger = self
            .store
            .ledger(self.config.kind, self.config.asset.decimals())?;

        let (eligible, deny_reason, retry_at) = match recipient {
            Some(recipient) => match self.policy.evaluate(recipient, self.clock.now())? {
                Decision::Allow => (Some(true), None, None),
                Decision::Deny { reason, retry_at } => (Some(false), Some(reason), retry_at),
            },
            None => (None, None, None),
        };

        Ok(FaucetStatus {
            faucet: self.config.kind,
            symbol: self.config.asset.symbol().to_string(),
            amount_per_claim: self.config.amount_per_claim.to_string(),
            global_cap: self.config.global_cap.to_string(),
            total_distributed: ledger.total_distributed.to_string(),
            recipients: ledger.recipients.len(),
            cooldown_secs: self.config.cooldown.num_seconds(),
            eligible,
            deny_reason,
            retry_at,
        })
    }

    /// Clear the ledger and every claim record of this faucet.
    pub async fn reset_ledger(&self, grant: &AdminGrant) -> Result<(), FaucetError> {
        if grant.faucet() != self.config.kind {
            return Err(FaucetError::Unauthorized(format!(
                "grant for {} faucet cannot reset {}",
                grant.faucet(),
                self.config.kind
            )));
        }
        let _guard = self.claim_lock.lock().await;
        self.store.reset(self.config.kind)?;
        warn!(faucet = %self.config.kind, "faucet ledger reset by admin");
        Ok(())
    }
}
