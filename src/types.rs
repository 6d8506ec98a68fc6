// src/types.rs
use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, U256},
};
use serde::{Deserialize, Serialize};

use crate::decode::{hex_bytes, quantity};

/// EntryPoint v0.6 user operation.
///
/// Decoded once at the RPC boundary. The `with_*` methods consume the value and
/// return the updated operation, so every estimation phase hands a fresh
/// operation to the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    #[serde(deserialize_with = "quantity")]
    pub nonce: U256,
    #[serde(deserialize_with = "hex_bytes")]
    pub init_code: Bytes,
    #[serde(deserialize_with = "hex_bytes")]
    pub call_data: Bytes,
    #[serde(deserialize_with = "quantity")]
    pub call_gas_limit: U256,
    #[serde(deserialize_with = "quantity")]
    pub verification_gas_limit: U256,
    #[serde(deserialize_with = "quantity")]
    pub pre_verification_gas: U256,
    #[serde(deserialize_with = "quantity")]
    pub max_fee_per_gas: U256,
    #[serde(deserialize_with = "quantity")]
    pub max_priority_fee_per_gas: U256,
    #[serde(deserialize_with = "hex_bytes")]
    pub paymaster_and_data: Bytes,
    #[serde(deserialize_with = "hex_bytes")]
    pub signature: Bytes,
}

impl UserOperation {
    pub fn with_paymaster_and_data(self, paymaster_and_data: Bytes) -> Self {
        Self {
            paymaster_and_data,
            ..self
        }
    }

    pub fn with_verification_gas_limit(self, verification_gas_limit: U256) -> Self {
        Self {
            verification_gas_limit,
            ..self
        }
    }

    pub fn with_call_gas_limit(self, call_gas_limit: U256) -> Self {
        Self {
            call_gas_limit,
            ..self
        }
    }

    pub fn with_pre_verification_gas(self, pre_verification_gas: U256) -> Self {
        Self {
            pre_verification_gas,
            ..self
        }
    }

    /// ABI encoding of every field, as the operation appears inside a
    /// `handleOps` calldata tuple. This is what calldata cost is charged on.
    pub fn pack(&self) -> Bytes {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::Bytes(self.init_code.to_vec()),
            Token::Bytes(self.call_data.to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::Bytes(self.paymaster_and_data.to_vec()),
            Token::Bytes(self.signature.to_vec()),
        ])
        .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorUserOperationResponse {
    pub paymaster_and_data: Bytes,
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}
