// src/gas.rs
use std::fmt;

use ethers::types::{Bytes, U256};

use crate::types::UserOperation;

pub const ARBITRUM_CHAIN_IDS: &[u64] = &[
    42161,  // Arbitrum One
    42170,  // Arbitrum Nova
    421613, // Arbitrum Goerli
    421614, // Arbitrum Sepolia
];

pub const OP_STACK_CHAIN_IDS: &[u64] = &[
    10,        // Optimism
    420,       // Optimism Goerli
    11155420,  // Optimism Sepolia
    8453,      // Base
    84531,     // Base Goerli
    84532,     // Base Sepolia
    7777777,   // Zora
    999999999, // Zora Sepolia
    34443,     // Mode
];

/// Rollup family of the connected network. Selected once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkFamily {
    Default,
    Arbitrum,
    Optimism,
}

impl NetworkFamily {
    /// Explicit flags and known chain IDs both count. Optimism is checked last
    /// and wins when both match.
    pub fn detect(chain_id: u64, force_arbitrum: bool, force_optimism: bool) -> Self {
        if force_optimism || OP_STACK_CHAIN_IDS.contains(&chain_id) {
            Self::Optimism
        } else if force_arbitrum || ARBITRUM_CHAIN_IDS.contains(&chain_id) {
            Self::Arbitrum
        } else {
            Self::Default
        }
    }

    /// Percent added on top of the calculated pre-verification gas.
    pub fn buffer_factor(self) -> u64 {
        match self {
            Self::Default => 1,
            Self::Arbitrum => 16,
            Self::Optimism => 1,
        }
    }
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Arbitrum => write!(f, "arbitrum"),
            Self::Optimism => write!(f, "optimism"),
        }
    }
}

/// Gas overheads used in calculating pre-verification gas.
/// see: https://github.com/eth-infinitism/bundler/blob/main/packages/sdk/src/calcPreVerificationGas.ts
#[derive(Clone, Copy, Debug)]
pub struct Overhead {
    fixed: U256,
    per_user_op: U256,
    per_user_op_word: U256,
    zero_byte: U256,
    non_zero_byte: U256,
    bundle_size: U256,
    sanitized_pvg: U256,
    sanitized_vgl: U256,
    sanitized_cgl: U256,
    buffer_factor: u64,
    family: NetworkFamily,
}

impl Overhead {
    pub fn new(family: NetworkFamily) -> Self {
        Self {
            fixed: 21000.into(),
            per_user_op: 18300.into(),
            per_user_op_word: 4.into(),
            zero_byte: 4.into(),
            non_zero_byte: 16.into(),
            bundle_size: 1.into(),
            sanitized_pvg: 100_000.into(),
            sanitized_vgl: 1_000_000.into(),
            sanitized_cgl: 1_000_000.into(),
            buffer_factor: family.buffer_factor(),
            family,
        }
    }

    pub fn family(&self) -> NetworkFamily {
        self.family
    }

    pub fn buffer_factor(&self) -> u64 {
        self.buffer_factor
    }

    /// Calldata and per-op overhead, excluding any L1 data surcharge.
    pub fn static_pre_verification_gas(&self, op: &UserOperation) -> U256 {
        let packed = self.sanitize(op).pack();
        let length_in_words = (packed.len() + 31) / 32;
        self.fixed / self.bundle_size
            + self.call_data_cost(&packed)
            + self.per_user_op
            + self.per_user_op_word * length_in_words
    }

    pub fn with_buffer(&self, pvg: U256) -> U256 {
        pvg + pvg * self.buffer_factor / 100
    }

    fn call_data_cost(&self, data: &Bytes) -> U256 {
        data.iter()
            .map(|&b| if b == 0 { self.zero_byte } else { self.non_zero_byte })
            .fold(U256::zero(), |total, cost| total + cost)
    }

    // Low gas values have more zero bytes than the final ones, which would
    // undercount calldata cost.
    fn sanitize(&self, op: &UserOperation) -> UserOperation {
        let verification_gas_limit = op.verification_gas_limit.max(self.sanitized_vgl);
        let call_gas_limit = op.call_gas_limit.max(self.sanitized_cgl);
        let pre_verification_gas = op.pre_verification_gas.max(self.sanitized_pvg);
        op.clone()
            .with_verification_gas_limit(verification_gas_limit)
            .with_call_gas_limit(call_gas_limit)
            .with_pre_verification_gas(pre_verification_gas)
    }
}
