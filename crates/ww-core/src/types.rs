//! Core data types: assets, transactions, receipts, prices and chat messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::amount::Amount;
use crate::constants::{ERC20_TRANSFER_SELECTOR, NATIVE_TRANSFER_GAS, TOKEN_TRANSFER_GAS};
use crate::error::ValidationError;

/// 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| ValidationError::InvalidTxHash(s.to_string()))?;
        let bytes = hex::decode(digits).map_err(|_| ValidationError::InvalidTxHash(s.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ValidationError::InvalidTxHash(s.to_string()))?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl FromStr for TxHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An asset tracked on the target chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Asset {
    /// The chain's gas currency.
    Native { symbol: String, decimals: u8 },
    /// An ERC-20 token contract.
    Token {
        symbol: String,
        contract: Address,
        decimals: u8,
    },
}

impl Asset {
    pub fn native(symbol: &str, decimals: u8) -> Self {
        Asset::Native {
            symbol: symbol.to_uppercase(),
            decimals,
        }
    }

    pub fn token(symbol: &str, contract: Address, decimals: u8) -> Self {
        Asset::Token {
            symbol: symbol.to_uppercase(),
            contract,
            decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Asset::Native { symbol, .. } | Asset::Token { symbol, .. } => symbol,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Asset::Native { decimals, .. } | Asset::Token { decimals, .. } => *decimals,
        }
    }

    pub fn contract(&self) -> Option<&Address> {
        match self {
            Asset::Native { .. } => None,
            Asset::Token { contract, .. } => Some(contract),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native { .. })
    }

    /// Gas limit used for fee estimates when moving this asset.
    pub fn transfer_gas_limit(&self) -> u64 {
        match self {
            Asset::Native { .. } => NATIVE_TRANSFER_GAS,
            Asset::Token { .. } => TOKEN_TRANSFER_GAS,
        }
    }
}

/// ERC-20 balance as reported by the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBalance {
    pub balance: Amount,
    pub symbol: String,
}

/// An unsigned transaction handed to a [`Signer`](crate::traits::Signer).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TransactionRequest {
    /// Sender; filled in by the signer when absent.
    pub from: Option<Address>,
    pub to: Address,
    /// Native value in wei.
    pub value: u128,
    /// Call data (empty for plain value transfers).
    pub data: Vec<u8>,
    /// Gas price in wei after the speed policy was applied.
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
}

impl TransactionRequest {
    /// Build a transfer of `amount` of `asset` to `to`.
    ///
    /// Native transfers carry the value directly; token transfers call
    /// `transfer(address,uint256)` on the contract.
    pub fn transfer(asset: &Asset, to: Address, amount: Amount) -> Self {
        match asset {
            Asset::Native { .. } => TransactionRequest {
                to,
                value: amount.units(),
                gas_limit: Some(NATIVE_TRANSFER_GAS),
                ..Default::default()
            },
            Asset::Token { contract, .. } => {
                let mut data = Vec::with_capacity(4 + 64);
                data.extend_from_slice(&ERC20_TRANSFER_SELECTOR);
                data.extend_from_slice(&to.abi_word());
                data.extend_from_slice(&u128_abi_word(amount.units()));
                TransactionRequest {
                    to: *contract,
                    data,
                    gas_limit: Some(TOKEN_TRANSFER_GAS),
                    ..Default::default()
                }
            }
        }
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

/// Left-pad a `u128` to a 32-byte big-endian ABI word.
pub fn u128_abi_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Outcome of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub success: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A USD quote as last fetched from the price feed.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceEntry {
    pub symbol: String,
    pub price_usd: f64,
    pub fetched_at: DateTime<Utc>,
}

impl PriceEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}
