// src/estimator.rs
use std::sync::Arc;

use ethers::types::{Address, U256};
use tracing::debug;

use crate::{
    chain::{ChainClient, ExecutionTracer},
    error::{PaymasterError, StageContext},
    gas::Overhead,
    paymaster_data::{dummy_paymaster_and_data, PaymasterData},
    signer::PaymasterSigner,
    types::UserOperation,
};

/// Default upper bound for any single gas limit of a sponsored operation.
pub const MAX_GAS_LIMIT: u64 = 18_000_000;

pub struct GasEstimator<C, S> {
    chain: Arc<C>,
    signer: Arc<S>,
    overhead: Overhead,
    native_tracer: bool,
    max_gas_limit: U256,
}

impl<C, S> GasEstimator<C, S>
where
    C: ChainClient,
    S: PaymasterSigner,
{
    pub fn new(
        chain: Arc<C>,
        signer: Arc<S>,
        overhead: Overhead,
        native_tracer: bool,
        max_gas_limit: U256,
    ) -> Self {
        Self {
            chain,
            signer,
            overhead,
            native_tracer,
            max_gas_limit,
        }
    }

    /// Returns `op` with gas limits that account for the paymaster's
    /// validation and for a paymasterAndData of the final length.
    ///
    /// The returned operation carries the dummy paymasterAndData; the caller
    /// signs the final values and replaces it.
    pub async fn override_op_gas_limits_for_pnd(
        &self,
        op: &UserOperation,
        entry_point: Address,
        data: &PaymasterData,
    ) -> Result<UserOperation, PaymasterError> {
        // Phase 1: simulate with a correctly signed paymasterAndData so the
        // paymaster's validation succeeds.
        let hash = self
            .chain
            .get_hash(op, data)
            .await
            .stage("placeholder hash")?;
        let signature = self
            .signer
            .sign_message(&hash)
            .stage("placeholder signature")?;
        let pnd = data.encode(&signature).stage("placeholder encoding")?;
        let pm_op = op.clone().with_paymaster_and_data(pnd);

        let tracer = self.native_tracer.then_some(ExecutionTracer::BundlerExecutor);
        let limits = self
            .chain
            .estimate_gas(entry_point, &pm_op, &self.overhead, self.max_gas_limit, tracer)
            .await
            .stage("gas estimation")?;

        // Phase 2: pre-verification gas is priced on calldata bytes, so it is
        // measured against the all non-zero dummy rather than the phase 1
        // signature.
        let pm_op = pm_op
            .with_paymaster_and_data(dummy_paymaster_and_data())
            .with_verification_gas_limit(limits.verification_gas_limit)
            .with_call_gas_limit(limits.call_gas_limit);
        let pre_verification_gas = self
            .chain
            .calc_pre_verification_gas(&pm_op, &self.overhead)
            .await
            .stage("pre-verification gas")?;
        debug!(
            verification_gas_limit = %limits.verification_gas_limit,
            call_gas_limit = %limits.call_gas_limit,
            %pre_verification_gas,
            "gas limits overridden for paymasterAndData"
        );

        Ok(pm_op.with_pre_verification_gas(pre_verification_gas))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use mockall::Sequence;

    use super::*;
    use crate::{
        chain::{GasLimits, MockChainClient},
        gas::NetworkFamily,
        paymaster_data::ENCODED_LENGTH,
        signer::{LocalSigner, MockPaymasterSigner},
    };

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn paymaster() -> Address {
        "0x00000000000000000000000000000000000000f1".parse().unwrap()
    }

    fn entry_point() -> Address {
        "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap()
    }

    fn op() -> UserOperation {
        UserOperation {
            sender: "0x9406cc6185a346906296840746125a0e44976454".parse().unwrap(),
            call_data: vec![0xb6, 0x1d, 0x27, 0xf6].into(),
            max_fee_per_gas: 1_500_000_000u64.into(),
            max_priority_fee_per_gas: 1_000_000_000u64.into(),
            ..Default::default()
        }
    }

    fn limits() -> GasLimits {
        GasLimits {
            verification_gas_limit: 110_000.into(),
            call_gas_limit: 45_000.into(),
        }
    }

    fn estimator<S: PaymasterSigner>(
        chain: MockChainClient,
        signer: S,
        native_tracer: bool,
    ) -> GasEstimator<MockChainClient, S> {
        GasEstimator::new(
            Arc::new(chain),
            Arc::new(signer),
            Overhead::new(NetworkFamily::Default),
            native_tracer,
            MAX_GAS_LIMIT.into(),
        )
    }

    #[tokio::test]
    async fn test_two_phase_order() {
        let mut chain = MockChainClient::new();
        let mut seq = Sequence::new();
        chain
            .expect_get_hash()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|op, data| op.paymaster_and_data.is_empty() && data.paymaster == paymaster())
            .returning(|_, _| Ok([7u8; 32]));
        chain
            .expect_estimate_gas()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|ep, op, _, max_gas_limit, tracer| {
                *ep == entry_point()
                    && op.paymaster_and_data.len() == ENCODED_LENGTH
                    && op.paymaster_and_data[..20] == *paymaster().as_bytes()
                    && op.paymaster_and_data.iter().any(|&b| b != 0x01)
                    && *max_gas_limit == U256::from(MAX_GAS_LIMIT)
                    && tracer.is_none()
            })
            .returning(|_, _, _, _, _| Ok(limits()));
        chain
            .expect_calc_pre_verification_gas()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|op, _| {
                op.paymaster_and_data == dummy_paymaster_and_data()
                    && op.verification_gas_limit == U256::from(110_000)
                    && op.call_gas_limit == U256::from(45_000)
            })
            .returning(|_, _| Ok(52_000.into()));

        let data = PaymasterData::new(paymaster(), Address::zero(), U256::zero());
        let pm_op = estimator(chain, LocalSigner::new(TEST_KEY).unwrap(), false)
            .override_op_gas_limits_for_pnd(&op(), entry_point(), &data)
            .await
            .unwrap();

        assert_eq!(pm_op.verification_gas_limit, U256::from(110_000));
        assert_eq!(pm_op.call_gas_limit, U256::from(45_000));
        assert_eq!(pm_op.pre_verification_gas, U256::from(52_000));
        assert_eq!(pm_op.paymaster_and_data, dummy_paymaster_and_data());
        assert_eq!(pm_op.sender, op().sender);
        assert_eq!(pm_op.call_data, op().call_data);
    }

    #[tokio::test]
    async fn test_native_tracer_is_requested() {
        let mut chain = MockChainClient::new();
        chain.expect_get_hash().returning(|_, _| Ok([1u8; 32]));
        chain
            .expect_estimate_gas()
            .withf(|_, _, _, _, tracer| *tracer == Some(ExecutionTracer::BundlerExecutor))
            .times(1)
            .returning(|_, _, _, _, _| Ok(limits()));
        chain
            .expect_calc_pre_verification_gas()
            .returning(|_, _| Ok(50_000.into()));

        let data = PaymasterData::new(paymaster(), Address::zero(), U256::zero());
        estimator(chain, LocalSigner::new(TEST_KEY).unwrap(), true)
            .override_op_gas_limits_for_pnd(&op(), entry_point(), &data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hash_failure_stops_pipeline() {
        let mut chain = MockChainClient::new();
        chain
            .expect_get_hash()
            .returning(|_, _| Err(anyhow!("execution reverted")));
        chain.expect_estimate_gas().never();
        chain.expect_calc_pre_verification_gas().never();
        let mut signer = MockPaymasterSigner::new();
        signer.expect_sign_message().never();

        let data = PaymasterData::new(paymaster(), Address::zero(), U256::zero());
        let error = estimator(chain, signer, false)
            .override_op_gas_limits_for_pnd(&op(), entry_point(), &data)
            .await
            .unwrap_err();

        assert!(matches!(error, PaymasterError::ChainCall(_)));
        assert!(error.to_string().contains("placeholder hash"));
    }

    #[tokio::test]
    async fn test_estimation_failure_skips_pre_verification_gas() {
        let mut chain = MockChainClient::new();
        chain.expect_get_hash().returning(|_, _| Ok([1u8; 32]));
        chain
            .expect_estimate_gas()
            .returning(|_, _, _, _, _| Err(anyhow!("validation reverted: AA33")));
        chain.expect_calc_pre_verification_gas().never();

        let data = PaymasterData::new(paymaster(), Address::zero(), U256::zero());
        let error = estimator(chain, LocalSigner::new(TEST_KEY).unwrap(), false)
            .override_op_gas_limits_for_pnd(&op(), entry_point(), &data)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("gas estimation"));
        assert!(error.to_string().contains("AA33"));
    }

    #[tokio::test]
    async fn test_signing_failure_is_reported() {
        let mut chain = MockChainClient::new();
        chain.expect_get_hash().returning(|_, _| Ok([1u8; 32]));
        chain.expect_estimate_gas().never();
        let mut signer = MockPaymasterSigner::new();
        signer
            .expect_sign_message()
            .returning(|_| Err(PaymasterError::Signing("key unavailable".to_string())));

        let data = PaymasterData::new(paymaster(), Address::zero(), U256::zero());
        let error = estimator(chain, signer, false)
            .override_op_gas_limits_for_pnd(&op(), entry_point(), &data)
            .await
            .unwrap_err();

        assert!(matches!(error, PaymasterError::Signing(_)));
        assert!(error.to_string().contains("placeholder signature"));
    }
}
