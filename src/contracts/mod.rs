// src/contracts/mod.rs
//! Contract bindings generated with `abigen!` from human-readable ABIs.

use ethers::types::{Address, H160};

use crate::types::UserOperation;

pub mod entry_point;
pub mod gas_price_oracle;
pub mod node_interface;
pub mod verifying_paymaster;

/// Arbitrum NodeInterface precompile.
pub const NODE_INTERFACE_ADDRESS: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xc8,
]);

/// OP Stack GasPriceOracle predeploy.
pub const GAS_PRICE_ORACLE_ADDRESS: Address = H160([
    0x42, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x0f,
]);

// Each binding generates its own copy of the UserOperation tuple struct.
macro_rules! impl_from_user_operation {
    ($target:ty) => {
        impl From<&UserOperation> for $target {
            fn from(op: &UserOperation) -> Self {
                Self {
                    sender: op.sender,
                    nonce: op.nonce,
                    init_code: op.init_code.clone(),
                    call_data: op.call_data.clone(),
                    call_gas_limit: op.call_gas_limit,
                    verification_gas_limit: op.verification_gas_limit,
                    pre_verification_gas: op.pre_verification_gas,
                    max_fee_per_gas: op.max_fee_per_gas,
                    max_priority_fee_per_gas: op.max_priority_fee_per_gas,
                    paymaster_and_data: op.paymaster_and_data.clone(),
                    signature: op.signature.clone(),
                }
            }
        }
    };
}

impl_from_user_operation!(entry_point::UserOperation);
impl_from_user_operation!(verifying_paymaster::UserOperation);
