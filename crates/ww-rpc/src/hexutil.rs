//! Hex quantities, byte strings and ABI return values.

use serde_json::{json, Value};
use ww_core::error::ChainError;
use ww_core::TransactionRequest;

pub fn quantity(value: u128) -> String {
    format!("0x{value:x}")
}

pub fn parse_quantity(s: &str) -> Result<u128, ChainError> {
    let digits = strip_prefix(s)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("quantity {s}: {e}")))
}

pub fn bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn parse_bytes(s: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(strip_prefix(s)?).map_err(|e| ChainError::Decode(format!("bytes: {e}")))
}

fn strip_prefix(s: &str) -> Result<&str, ChainError> {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| ChainError::Decode(format!("missing 0x prefix: {s}")))
}

/// First 32-byte word as an unsigned integer. Values above `u128::MAX` are
/// rejected.
pub fn abi_uint(data: &[u8]) -> Result<u128, ChainError> {
    let word = data
        .get(..32)
        .ok_or_else(|| ChainError::Decode(format!("abi word too short: {} bytes", data.len())))?;
    if word[..16].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("abi uint exceeds 128 bits".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn abi_usize(data: &[u8]) -> Result<usize, ChainError> {
    usize::try_from(abi_uint(data)?).map_err(|_| ChainError::Decode("abi offset exceeds usize".into()))
}

/// ABI `string` return value. Tokens that return `bytes32` instead are
/// accepted too.
pub fn abi_string(data: &[u8]) -> Result<String, ChainError> {
    if data.len() == 32 {
        let end = data.iter().position(|b| *b == 0).unwrap_or(32);
        return Ok(String::from_utf8_lossy(&data[..end]).into_owned());
    }
    let offset = abi_usize(data)?;
    let len_word = data
        .get(offset..)
        .ok_or_else(|| ChainError::Decode("abi string offset out of range".into()))?;
    let len = abi_usize(len_word)?;
    let raw = offset
        .checked_add(32)
        .and_then(|start| Some(start..start.checked_add(len)?))
        .and_then(|range| data.get(range))
        .ok_or_else(|| ChainError::Decode("abi string length out of range".into()))?;
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// `eth_sendTransaction` parameter object.
pub fn transaction_json(request: &TransactionRequest) -> Value {
    let mut tx = json!({
        "to": request.to.to_hex(),
        "value": quantity(request.value),
    });
    if let Some(from) = request.from {
        tx["from"] = json!(from.to_hex());
    }
    if !request.data.is_empty() {
        tx["data"] = json!(bytes(&request.data));
    }
    if let Some(gas_price) = request.gas_price {
        tx["gasPrice"] = json!(quantity(gas_price));
    }
    if let Some(gas) = request.gas_limit {
        tx["gas"] = json!(quantity(gas as u128));
    }
    tx
}
