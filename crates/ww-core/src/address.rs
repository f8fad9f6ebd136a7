//! EVM account addresses.
//!
//! An address is 20 bytes rendered as `0x` followed by 40 hex digits. Input is
//! accepted in any letter case; the canonical form (used for display, storage
//! keys and equality) is lower case. EIP-55 checksums are not verified: the
//! faucet only needs a syntactically well-formed address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Parse a `0x`-prefixed, 40-hex-digit address. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ValidationError::InvalidAddress(format!("missing 0x prefix: {trimmed}")))?;

        if digits.len() != ADDRESS_LEN * 2 {
            return Err(ValidationError::InvalidAddress(format!(
                "expected {} hex digits, got {}",
                ADDRESS_LEN * 2,
                digits.len()
            )));
        }

        let bytes = hex::decode(digits)
            .map_err(|e| ValidationError::InvalidAddress(format!("{trimmed}: {e}")))?;
        let array: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| ValidationError::InvalidAddress(trimmed.to_string()))?;
        Ok(Self(array))
    }

    /// Canonical lower-case `0x…` form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Key under which per-recipient state is persisted.
    pub fn storage_key(&self) -> String {
        self.to_hex()
    }

    /// Left-pad to a 32-byte ABI word.
    pub fn abi_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
