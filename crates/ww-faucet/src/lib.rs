//! # ww-faucet: rate-limited faucets with a persisted distribution ledger.
//!
//! A faucet dispenses a fixed amount of one asset per claim, subject to a
//! per-recipient limit (one-time or cooldown) and a global distribution cap.
//!
//! # Modules
//!
//! - [`config`]: `FaucetKind`, `FaucetPolicyConfig` presets
//! - [`error`]: `FaucetError`, `DenyReason`, `AdminError`
//! - [`store`]: `CounterStore` trait, ledger/claim records, in-memory store
//! - [`rocks`]: RocksDB-backed `CounterStore`
//! - [`policy`]: pure claim eligibility decision
//! - [`dispenser`]: one claim attempt end to end
//! - [`admin`]: signed administrative authorization for ledger resets

pub mod admin;
pub mod config;
pub mod dispenser;
pub mod error;
pub mod policy;
pub mod rocks;
pub mod store;

pub use admin::{AdminGate, AdminGrant};
pub use config::{FaucetKind, FaucetPolicyConfig};
pub use dispenser::{FaucetDispenser, FaucetStatus};
pub use error::{AdminError, DenyReason, FaucetError};
pub use policy::{Decision, RateLimitPolicy};
pub use rocks::RocksCounterStore;
pub use store::{ClaimRecord, CounterStore, DistributionLedger, MemoryCounterStore};
