//! Error types shared across Welcome Wallet crates.
use thiserror::Error;

/// User-correctable input problems, shown inline by the UI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address: {0}")] InvalidAddress(String),
    #[error("invalid amount: {0}")] InvalidAmount(String),
    #[error("amount must be greater than zero")] ZeroAmount,
    #[error("too many decimal places: got {got}, max {max}")] TooManyDecimals { got: usize, max: u8 },
    #[error("amount overflow")] AmountOverflow,
    #[error("invalid transaction hash: {0}")] InvalidTxHash(String),
    #[error("unknown asset: {0}")] UnknownAsset(String),
    #[error("unknown gas speed: {0}")] InvalidGasSpeed(String),
    #[error("unknown faucet: {0}")] UnknownFaucet(String),
}

/// Failures of the chain collaborator (reads, submission, confirmation).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc: {0}")] Rpc(String),
    #[error("decode: {0}")] Decode(String),
    #[error("signer: {0}")] Signer(String),
    #[error("transaction {0} reverted")] Reverted(String),
    #[error("no confirmation for {tx_hash} after {waited_secs}s")] ConfirmationTimeout { tx_hash: String, waited_secs: u64 },
}

/// Failures of auxiliary feeds (prices, chat). Callers degrade instead of failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream unavailable: {0}")] Unavailable(String),
    #[error("invalid upstream response: {0}")] InvalidResponse(String),
    #[error("upstream not configured")] NotConfigured,
}

/// Persisted counter store failures. Faucet callers fail closed on these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("corrupt record {key}: {reason}")] Corrupt { key: String, reason: String },
}
