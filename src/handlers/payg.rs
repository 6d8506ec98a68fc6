// src/handlers/payg.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use tracing::debug;

use super::Strategy;
use crate::{
    chain::ChainClient,
    error::{PaymasterError, StageContext},
    estimator::GasEstimator,
    paymaster_data::PaymasterData,
    signer::PaymasterSigner,
    types::{SponsorUserOperationResponse, UserOperation},
};

/// Sponsors every operation in the native token.
pub struct PaygHandler<C, S> {
    chain: Arc<C>,
    signer: Arc<S>,
    estimator: GasEstimator<C, S>,
}

impl<C, S> PaygHandler<C, S>
where
    C: ChainClient,
    S: PaymasterSigner,
{
    pub fn new(chain: Arc<C>, signer: Arc<S>, estimator: GasEstimator<C, S>) -> Self {
        Self {
            chain,
            signer,
            estimator,
        }
    }
}

#[async_trait]
impl<C, S> Strategy for PaygHandler<C, S>
where
    C: ChainClient,
    S: PaymasterSigner,
{
    async fn run(
        &self,
        op: &UserOperation,
        entry_point: Address,
        paymaster: Address,
    ) -> Result<SponsorUserOperationResponse, PaymasterError> {
        let data = PaymasterData::new(paymaster, Address::zero(), U256::zero());
        let op = self
            .estimator
            .override_op_gas_limits_for_pnd(op, entry_point, &data)
            .await?;

        let hash = self.chain.get_hash(&op, &data).await.stage("final hash")?;
        let signature = self.signer.sign_message(&hash).stage("final signature")?;
        let paymaster_and_data = data.encode(&signature).stage("final encoding")?;
        debug!(valid_until = data.valid_until, %paymaster, "signed sponsorship");

        Ok(SponsorUserOperationResponse {
            paymaster_and_data,
            pre_verification_gas: op.pre_verification_gas,
            verification_gas_limit: op.verification_gas_limit,
            call_gas_limit: op.call_gas_limit,
        })
    }
}
