//! HTTP error responses.
//!
//! Every failure is rendered as `{"error": CODE, "message": ...}` with the
//! status chosen per error kind. Transfer failures carry a generic message;
//! the detail only goes to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;

use ww_core::error::ValidationError;
use ww_faucet::{AdminError, DenyReason, FaucetError};

use crate::send::SendError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retry_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_at: None,
            tx_hash: None,
        }
    }

    pub fn not_logged_in() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "NOT_LOGGED_IN", "log in with a wallet first")
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", what)
    }

    fn with_tx_hash(mut self, tx_hash: String) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code, "message": self.message });
        if let Some(retry_at) = self.retry_at {
            body["retry_at"] = json!(retry_at);
        }
        if let Some(tx_hash) = self.tx_hash {
            body["tx_hash"] = json!(tx_hash);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        let code = match &e {
            ValidationError::InvalidAddress(_) => "INVALID_ADDRESS",
            _ => "INVALID_REQUEST",
        };
        Self::new(StatusCode::BAD_REQUEST, code, e.to_string())
    }
}

impl From<FaucetError> for ApiError {
    fn from(e: FaucetError) -> Self {
        let code = e.code();
        match e {
            FaucetError::InvalidAddress(v) => ApiError::from(v),
            FaucetError::RateLimited { reason, retry_at } => Self {
                retry_at,
                ..Self::new(StatusCode::TOO_MANY_REQUESTS, reason.code(), deny_message(reason))
            },
            FaucetError::FundingUnavailable(detail) => {
                warn!(%detail, "faucet funding unavailable");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    code,
                    "the faucet is temporarily out of funds",
                )
            }
            FaucetError::TransferFailed(detail) => {
                warn!(%detail, "faucet transfer failed");
                Self::new(StatusCode::BAD_GATEWAY, code, "transfer failed; nothing was recorded, please retry")
            }
            FaucetError::ConfirmationTimeout { tx_hash } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                code,
                "transfer sent but not yet confirmed; check the transaction before retrying",
            )
            .with_tx_hash(tx_hash.to_hex()),
            FaucetError::Storage(detail) => {
                warn!(%detail, "faucet storage unavailable");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, code, "faucet temporarily unavailable")
            }
            FaucetError::Unauthorized(detail) => Self::new(StatusCode::FORBIDDEN, code, detail),
        }
    }
}

fn deny_message(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::AlreadyClaimed => "this wallet has already claimed from this faucet",
        DenyReason::CooldownActive => "this wallet claimed recently; try again later",
        DenyReason::GlobalCapReached => "the faucet has reached its distribution limit",
    }
}

impl From<AdminError> for ApiError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Disabled => Self::new(StatusCode::FORBIDDEN, "ADMIN_DISABLED", e.to_string()),
            AdminError::InvalidKey(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "ADMIN_MISCONFIGURED", e.to_string()),
            _ => Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
        }
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Validation(v) => ApiError::from(v),
            SendError::Network(detail) => {
                warn!(error = %detail, "send aborted: chain unavailable");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "NETWORK_UNAVAILABLE", "network unavailable, please retry")
            }
            SendError::Submit(detail) => {
                warn!(error = %detail, "send rejected by signer");
                Self::new(StatusCode::BAD_GATEWAY, "TRANSFER_FAILED", "transaction could not be submitted")
            }
            SendError::Reverted(tx_hash) => Self::new(StatusCode::BAD_GATEWAY, "TRANSFER_FAILED", "transaction reverted")
                .with_tx_hash(tx_hash.to_hex()),
            SendError::ConfirmationTimeout(tx_hash) => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "CONFIRMATION_TIMEOUT",
                "transaction sent but not yet confirmed",
            )
            .with_tx_hash(tx_hash.to_hex()),
        }
    }
}
