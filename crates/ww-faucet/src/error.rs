//! Faucet error types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use ww_core::error::{StorageError, ValidationError};
use ww_core::TxHash;

/// Why a claim was denied by the rate-limit policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// The recipient claimed within the cooldown window.
    CooldownActive,
    /// The recipient already used its one-time claim.
    AlreadyClaimed,
    /// Another claim would push the ledger past the global cap.
    GlobalCapReached,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::CooldownActive => "COOLDOWN_ACTIVE",
            DenyReason::AlreadyClaimed => "ALREADY_CLAIMED",
            DenyReason::GlobalCapReached => "GLOBAL_CAP_REACHED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors that can end a dispense attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaucetError {
    /// Malformed recipient address.
    #[error(transparent)]
    InvalidAddress(#[from] ValidationError),

    /// Denied by the rate-limit policy; `retry_at` is set for cooldowns.
    #[error("rate limited: {reason}")]
    RateLimited {
        reason: DenyReason,
        retry_at: Option<DateTime<Utc>>,
    },

    /// The funding wallet is missing or cannot cover amount plus fees.
    #[error("funding unavailable: {0}")]
    FundingUnavailable(String),

    /// Submission failed or the transaction reverted. Nothing was recorded.
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// The transaction was sent but not seen mined in time. Nothing was recorded.
    #[error("no confirmation for {tx_hash}")]
    ConfirmationTimeout { tx_hash: TxHash },

    /// Claim history could not be read or written. Claims are denied.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An admin grant for a different faucet was presented.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl FaucetError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::InvalidAddress(_) => "INVALID_ADDRESS",
            FaucetError::RateLimited { .. } => "RATE_LIMITED",
            FaucetError::FundingUnavailable(_) => "FUNDING_UNAVAILABLE",
            FaucetError::TransferFailed(_) => "TRANSFER_FAILED",
            FaucetError::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            FaucetError::Storage(_) => "STORAGE_UNAVAILABLE",
            FaucetError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }

    /// Deny reason when this is a rate-limit rejection.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            FaucetError::RateLimited { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Errors from the administrative gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("admin access is not configured")] Disabled,
    #[error("invalid admin public key: {0}")] InvalidKey(String),
    #[error("invalid admin signature")] InvalidSignature,
    #[error("admin timestamp outside the accepted window")] Expired,
    #[error("malformed admin timestamp: {0}")] MalformedTimestamp(String),
}
