// src/paymaster.rs
use ethers::{types::Address, utils::to_checksum};
use serde_json::Value;
use tracing::{error, field, info, info_span, Instrument, Span};

use crate::{
    error::PaymasterError,
    handlers::{
        context::{decode, SponsorshipContext},
        Strategies,
    },
    registry::EntryPointRegistry,
    types::{SponsorUserOperationResponse, UserOperation},
};

/// Routes sponsorship requests to the strategy named in their context.
pub struct Paymaster {
    registry: EntryPointRegistry,
    strategies: Strategies,
    chain_id: u64,
}

impl Paymaster {
    pub fn new(registry: EntryPointRegistry, strategies: Strategies, chain_id: u64) -> Self {
        Self {
            registry,
            strategies,
            chain_id,
        }
    }

    /// Paymaster addresses registered for `entry_point`, checksummed.
    pub fn accounts(&self, entry_point: &str) -> Result<Vec<String>, PaymasterError> {
        let span = info_span!(
            "pm_accounts",
            entry_point,
            chain_id = self.chain_id,
            paymasters = field::Empty,
        );
        let _enter = span.enter();
        let result = parse_entry_point(entry_point)
            .and_then(|ep| self.registry.paymasters(&ep))
            .map(|paymasters| {
                span.record("paymasters", field::debug(paymasters));
                paymasters.iter().map(|pm| to_checksum(pm, None)).collect::<Vec<_>>()
            });
        match &result {
            Ok(accounts) => info!(count = accounts.len(), "pm_accounts ok"),
            Err(error) => error!(%error, "pm_accounts error"),
        }
        result
    }

    pub async fn sponsor_user_operation(
        &self,
        user_op: Value,
        entry_point: &str,
        context: Value,
    ) -> Result<SponsorUserOperationResponse, PaymasterError> {
        let span = info_span!(
            "pm_sponsorUserOperation",
            entry_point,
            chain_id = self.chain_id,
            paymasters = field::Empty,
            strategy = field::Empty,
        );
        let result = self
            .sponsor(user_op, entry_point, context)
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        match &result {
            Ok(response) => info!(
                pre_verification_gas = %response.pre_verification_gas,
                verification_gas_limit = %response.verification_gas_limit,
                call_gas_limit = %response.call_gas_limit,
                "pm_sponsorUserOperation ok"
            ),
            Err(error) => error!(%error, "pm_sponsorUserOperation error"),
        }
        result
    }

    async fn sponsor(
        &self,
        user_op: Value,
        entry_point: &str,
        context: Value,
    ) -> Result<SponsorUserOperationResponse, PaymasterError> {
        let entry_point = parse_entry_point(entry_point)?;
        let paymasters = self.registry.paymasters(&entry_point)?;
        Span::current().record("paymasters", field::debug(paymasters));

        let op: UserOperation = decode("userOp", user_op)?;
        let context = SponsorshipContext::from_value(context)?;
        Span::current().record("strategy", context.kind.as_str());
        let strategy = self.strategies.get(context.strategy()?)?;

        // Only the first registered paymaster is used.
        let paymaster = paymasters
            .first()
            .copied()
            .ok_or(PaymasterError::UnsupportedEntryPoint(entry_point))?;
        strategy.run(&op, entry_point, paymaster).await
    }
}

fn parse_entry_point(entry_point: &str) -> Result<Address, PaymasterError> {
    entry_point
        .parse()
        .map_err(|e| PaymasterError::Validation(format!("bad entryPoint {entry_point}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use ethers::types::U256;
    use serde_json::json;

    use super::*;
    use crate::handlers::{MockStrategy, StrategyKind};

    const EP: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    const UNREGISTERED_EP: &str = "0x0000000000000000000000000000000000000e99";
    const PM_1: &str = "0x00000000000000000000000000000000000000f1";
    const PM_2: &str = "0x00000000000000000000000000000000000000f2";

    fn paymaster(strategy: MockStrategy) -> Paymaster {
        let registry = format!("{EP}={PM_1},{PM_2}").parse().unwrap();
        let strategies = Strategies::new().register(StrategyKind::Payg, Arc::new(strategy));
        Paymaster::new(registry, strategies, 1)
    }

    fn user_op() -> Value {
        json!({
            "sender": "0x9406cc6185a346906296840746125a0e44976454",
            "nonce": "0x0",
            "initCode": "0x",
            "callData": "0xb61d27f6",
            "callGasLimit": "0x0",
            "verificationGasLimit": "0x0",
            "preVerificationGas": "0x0",
            "maxFeePerGas": "0x59682f00",
            "maxPriorityFeePerGas": "0x3b9aca00",
            "paymasterAndData": "0x",
            "signature": "0x"
        })
    }

    fn response() -> SponsorUserOperationResponse {
        SponsorUserOperationResponse {
            paymaster_and_data: vec![0x01; 4].into(),
            pre_verification_gas: U256::from(48_000),
            verification_gas_limit: U256::from(120_000),
            call_gas_limit: U256::from(33_000),
        }
    }

    fn idle_strategy() -> MockStrategy {
        let mut strategy = MockStrategy::new();
        strategy.expect_run().never();
        strategy
    }

    #[tokio::test]
    async fn test_first_paymaster_is_selected() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_run()
            .times(1)
            .withf(|op, ep, pm| {
                *ep == EP.parse::<Address>().unwrap()
                    && *pm == PM_1.parse::<Address>().unwrap()
                    && op.max_fee_per_gas == U256::from(1_500_000_000u64)
            })
            .returning(|_, _, _| Ok(response()));

        let result = paymaster(strategy)
            .sponsor_user_operation(user_op(), EP, json!({ "type": "payg" }))
            .await
            .unwrap();
        assert_eq!(result, response());
    }

    #[tokio::test]
    async fn test_unregistered_entry_point() {
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(json!({}), UNREGISTERED_EP, json!({ "type": "payg" }))
            .await
            .unwrap_err();
        assert!(matches!(error, PaymasterError::UnsupportedEntryPoint(_)));
    }

    #[tokio::test]
    async fn test_bad_entry_point() {
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(user_op(), "entrypoint", json!({ "type": "payg" }))
            .await
            .unwrap_err();
        assert!(matches!(error, PaymasterError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bad_user_op() {
        let mut op = user_op();
        op["callData"] = json!("b61d27f6");
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(op, EP, json!({ "type": "payg" }))
            .await
            .unwrap_err();
        assert!(error.to_string().starts_with("bad userOp:"), "{error}");
    }

    #[tokio::test]
    async fn test_positional_user_op_is_rejected() {
        let op = Value::Array(user_op().as_object().unwrap().values().cloned().collect());
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(op, EP, json!({ "type": "payg" }))
            .await
            .unwrap_err();
        assert!(matches!(error, PaymasterError::Validation(_)));
        assert_eq!(error.to_string(), "bad userOp: expected a JSON object");
    }

    #[tokio::test]
    async fn test_missing_context_type() {
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(user_op(), EP, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(error, PaymasterError::Validation(_)));
        assert!(error.to_string().starts_with("bad context:"), "{error}");
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let error = paymaster(idle_strategy())
            .sponsor_user_operation(user_op(), EP, json!({ "type": "subscription" }))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "type: subscription not recognized");
    }

    #[tokio::test]
    async fn test_strategy_error_is_returned() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_run()
            .returning(|_, _, _| Err(PaymasterError::Signing("final signature: hsm offline".into())));
        let error = paymaster(strategy)
            .sponsor_user_operation(user_op(), EP, json!({ "type": "payg" }))
            .await
            .unwrap_err();
        assert!(matches!(error, PaymasterError::Signing(_)));
    }

    #[test]
    fn test_accounts() {
        let accounts = paymaster(idle_strategy()).accounts(EP).unwrap();
        let expected: Vec<String> = [PM_1, PM_2]
            .iter()
            .map(|pm| to_checksum(&pm.parse().unwrap(), None))
            .collect();
        assert_eq!(accounts, expected);
        assert_eq!(accounts[0].to_lowercase(), PM_1);
        assert!(matches!(
            paymaster(idle_strategy()).accounts(UNREGISTERED_EP),
            Err(PaymasterError::UnsupportedEntryPoint(_))
        ));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let logs = buffer.0.lock().unwrap().clone();
        String::from_utf8(logs).unwrap()
    }

    #[test]
    fn test_accounts_logs_paymasters() {
        let logs = captured_logs(|| {
            paymaster(idle_strategy()).accounts(EP).unwrap();
        });
        assert!(logs.contains("pm_accounts ok"), "{logs}");
        assert!(logs.contains("paymasters=["), "{logs}");
        assert!(logs.contains(PM_2), "{logs}");

        let logs = captured_logs(|| {
            paymaster(idle_strategy()).accounts(UNREGISTERED_EP).unwrap_err();
        });
        assert!(logs.contains("pm_accounts error"), "{logs}");
        assert!(logs.contains("chain_id=1"), "{logs}");
    }
}
