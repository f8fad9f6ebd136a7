//! Claim eligibility.
//!
//! [`decide`] is a pure function of the recipient's last claim, the ledger,
//! the policy and the current time. [`RateLimitPolicy`] reads those inputs
//! from a [`CounterStore`] and never writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use ww_core::error::StorageError;
use ww_core::Address;

use crate::config::FaucetPolicyConfig;
use crate::error::DenyReason;
use crate::store::{ClaimRecord, CounterStore, DistributionLedger};

/// Result of evaluating a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny {
        reason: DenyReason,
        retry_at: Option<DateTime<Utc>>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether a claim may proceed.
///
/// Per-recipient limits are checked before the global cap, so a recipient in
/// cooldown learns its retry time even when the faucet is also exhausted.
pub fn decide(
    config: &FaucetPolicyConfig,
    last_claim: Option<&ClaimRecord>,
    ledger: &DistributionLedger,
    now: DateTime<Utc>,
) -> Decision {
    if let Some(last) = last_claim {
        if config.is_one_time() {
            return Decision::Deny {
                reason: DenyReason::AlreadyClaimed,
                retry_at: None,
            };
        }
        let retry_at = last.claimed_at + config.cooldown;
        if now < retry_at {
            return Decision::Deny {
                reason: DenyReason::CooldownActive,
                retry_at: Some(retry_at),
            };
        }
    }

    let exceeds_cap = match ledger.total_distributed.checked_add(config.amount_per_claim) {
        Some(after) => after.units() > config.global_cap.units(),
        None => true,
    };
    if exceeds_cap {
        return Decision::Deny {
            reason: DenyReason::GlobalCapReached,
            retry_at: None,
        };
    }

    Decision::Allow
}

/// Store-backed evaluation of [`decide`].
#[derive(Clone)]
pub struct RateLimitPolicy {
    config: Arc<FaucetPolicyConfig>,
    store: Arc<dyn CounterStore>,
}

impl RateLimitPolicy {
    pub fn new(config: Arc<FaucetPolicyConfig>, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Evaluate a claim by `recipient` at `now`.
    ///
    /// A store failure is returned as an error, never as `Allow`.
    pub fn evaluate(&self, recipient: &Address, now: DateTime<Utc>) -> Result<Decision, StorageError> {
        let faucet = self.config.kind;
        let last = self.store.last_claim(faucet, recipient)?;
        let ledger = self.store.ledger(faucet, self.config.asset.decimals())?;
        let decision = decide(&self.config, last.as_ref(), &ledger, now);
        debug!(%faucet, %recipient, ?decision, "rate limit evaluated");
        Ok(decision)
    }
}
