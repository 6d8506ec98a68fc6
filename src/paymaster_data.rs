// src/paymaster_data.rs
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(test)]
use ethers::abi::{decode, ParamType};
use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, U256},
};

use crate::error::PaymasterError;

/// Seconds a fresh authorization stays valid.
pub const VALIDITY_WINDOW: u64 = 3600;

pub const SIGNATURE_LENGTH: usize = 65;

const ADDRESS_LENGTH: usize = 20;

/// validUntil, validAfter, erc20Token and exchangeRate, one ABI word each.
const PACKED_LENGTH: usize = 4 * 32;

/// Total length of an encoded paymasterAndData blob.
pub const ENCODED_LENGTH: usize = ADDRESS_LENGTH + PACKED_LENGTH + SIGNATURE_LENGTH;

const MAX_UINT48: u64 = (1 << 48) - 1;

/// Terms the paymaster contract verifies alongside its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterData {
    pub paymaster: Address,
    pub valid_until: u64,
    pub valid_after: u64,
    /// Zero address means fees are paid in the native token.
    pub erc20_token: Address,
    pub exchange_rate: U256,
}

impl PaymasterData {
    pub fn new(paymaster: Address, erc20_token: Address, exchange_rate: U256) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self::issued_at(paymaster, erc20_token, exchange_rate, now)
    }

    pub fn issued_at(paymaster: Address, erc20_token: Address, exchange_rate: U256, now: u64) -> Self {
        Self {
            paymaster,
            valid_until: now + VALIDITY_WINDOW,
            valid_after: 0,
            erc20_token,
            exchange_rate,
        }
    }

    /// Encodes `paymaster ‖ abi.encode(validUntil, validAfter, erc20Token, exchangeRate) ‖ signature`.
    ///
    /// The contract slices this blob by position, so the layout must not change.
    pub fn encode(&self, signature: &[u8]) -> Result<Bytes, PaymasterError> {
        if signature.len() != SIGNATURE_LENGTH {
            return Err(PaymasterError::Encoding(format!(
                "signature must be {SIGNATURE_LENGTH} bytes, got {}",
                signature.len()
            )));
        }
        for (name, value) in [
            ("validUntil", self.valid_until),
            ("validAfter", self.valid_after),
        ] {
            if value > MAX_UINT48 {
                return Err(PaymasterError::Encoding(format!(
                    "{name} {value} does not fit in uint48"
                )));
            }
        }
        if self.valid_until <= self.valid_after {
            return Err(PaymasterError::Encoding(format!(
                "validUntil {} must be after validAfter {}",
                self.valid_until, self.valid_after
            )));
        }

        let packed = encode(&[
            Token::Uint(self.valid_until.into()),
            Token::Uint(self.valid_after.into()),
            Token::Address(self.erc20_token),
            Token::Uint(self.exchange_rate),
        ]);

        let mut blob = Vec::with_capacity(ENCODED_LENGTH);
        blob.extend_from_slice(self.paymaster.as_bytes());
        blob.extend_from_slice(&packed);
        blob.extend_from_slice(signature);
        Ok(blob.into())
    }

    /// Splits an encoded blob back into its terms and signature.
    #[cfg(test)]
    pub fn decode(blob: &[u8]) -> Result<(Self, Bytes), PaymasterError> {
        if blob.len() != ENCODED_LENGTH {
            return Err(PaymasterError::Encoding(format!(
                "paymasterAndData must be {ENCODED_LENGTH} bytes, got {}",
                blob.len()
            )));
        }
        let (paymaster, rest) = blob.split_at(ADDRESS_LENGTH);
        let (packed, signature) = rest.split_at(PACKED_LENGTH);

        let tokens = decode(
            &[
                ParamType::Uint(48),
                ParamType::Uint(48),
                ParamType::Address,
                ParamType::Uint(256),
            ],
            packed,
        )
        .map_err(|e| PaymasterError::Encoding(e.to_string()))?;
        let [Token::Uint(valid_until), Token::Uint(valid_after), Token::Address(erc20_token), Token::Uint(exchange_rate)] =
            tokens.as_slice()
        else {
            return Err(PaymasterError::Encoding(
                "unexpected paymaster data tokens".to_string(),
            ));
        };

        let data = Self {
            paymaster: Address::from_slice(paymaster),
            valid_until: to_uint48(*valid_until, "validUntil")?,
            valid_after: to_uint48(*valid_after, "validAfter")?,
            erc20_token: *erc20_token,
            exchange_rate: *exchange_rate,
        };
        Ok((data, Bytes::from(signature.to_vec())))
    }
}

#[cfg(test)]
fn to_uint48(value: U256, name: &str) -> Result<u64, PaymasterError> {
    if value > U256::from(MAX_UINT48) {
        return Err(PaymasterError::Encoding(format!(
            "{name} {value} does not fit in uint48"
        )));
    }
    Ok(value.as_u64())
}

// Same length as a real blob but every byte is non-zero, so calldata cost
// computed against it is an upper bound for any real signature.
pub fn dummy_paymaster_and_data() -> Bytes {
    vec![0x01; ENCODED_LENGTH].into()
}
