//! # ww-core
//! Foundation types, error taxonomy and collaborator traits for Welcome Wallet.

pub mod address;
pub mod amount;
pub mod constants;
pub mod error;
pub mod gas;
pub mod time;
pub mod traits;
pub mod types;

pub use address::Address;
pub use amount::Amount;
pub use gas::{GasPolicy, GasSpeed};
pub use time::{Clock, ManualClock, SystemClock};
pub use types::{
    Asset, ChatMessage, ChatRole, PriceEntry, Receipt, TokenBalance, TransactionRequest, TxHash,
};
