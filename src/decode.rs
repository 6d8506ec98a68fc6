// src/decode.rs
//! Serde coercions for inbound JSON values.

use ethers::types::{Bytes, U256};
use serde::{de::Error, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(u64),
    Text(String),
}

/// Accepts a `0x` hex string, a decimal string or a JSON integer.
pub fn quantity<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(U256::from(n)),
        Quantity::Text(s) => parse_quantity(&s).map_err(D::Error::custom),
    }
}

fn parse_quantity(s: &str) -> Result<U256, String> {
    if let Some(digits) = s.strip_prefix("0x") {
        U256::from_str_radix(digits, 16).map_err(|e| format!("invalid hex quantity {s}: {e}"))
    } else {
        U256::from_dec_str(s).map_err(|e| format!("invalid decimal quantity {s}: {e}"))
    }
}

/// Byte strings must carry the `0x` prefix.
pub fn hex_bytes<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| D::Error::custom(format!("not byte string: {s}")))?;
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| D::Error::custom(format!("invalid byte string {s}: {e}")))
}
