// src/chain/estimation.rs
use anyhow::{bail, Context};
use ethers::{
    abi::AbiDecode,
    contract::ContractError,
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionRequest,
        U256,
    },
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExecutionTracer, GasLimits};
use crate::{
    contracts::entry_point::{EntryPoint, ExecutionResult, FailedOp},
    gas::Overhead,
    types::UserOperation,
};

/// Gas estimates will be rounded up to the next multiple of this. Larger values
/// mean fewer simulation rounds per binary search.
const GAS_ROUNDING: u64 = 1024;

/// Output of the node's native `bundlerExecutorTracer` for `simulateHandleOp`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutorTracerOutput {
    #[serde(default)]
    reverts: Vec<String>,
    #[serde(default, rename = "validationOOG")]
    validation_oog: bool,
    #[serde(default, rename = "executionOOG")]
    execution_oog: bool,
    #[serde(default)]
    error: String,
}

pub(super) async fn estimate_gas<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
    overhead: &Overhead,
    max_gas_limit: U256,
    tracer: Option<ExecutionTracer>,
) -> anyhow::Result<GasLimits>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let max_gas = max_gas_limit.min(U256::from(u64::MAX)).as_u64();
    // Simulate with a realistic prefund.
    let pre_verification_gas = overhead
        .static_pre_verification_gas(op)
        .max(op.pre_verification_gas);
    let op = op.clone().with_pre_verification_gas(pre_verification_gas);

    let verification_gas_limit = binary_search_verification_gas(entry_point, &op, max_gas).await?;
    let op = op.with_verification_gas_limit(verification_gas_limit);
    let call_gas_limit = match tracer {
        Some(tracer) => binary_search_call_gas(entry_point, &op, max_gas, tracer).await?,
        // An undeployed sender has no code until its initCode runs.
        None if !op.init_code.is_empty() => simulate_call_gas(entry_point, &op, max_gas).await?,
        None => estimate_call_gas(entry_point, &op).await?,
    };
    debug!(%verification_gas_limit, %call_gas_limit, tracer = ?tracer, "estimated gas limits");

    Ok(GasLimits {
        verification_gas_limit,
        call_gas_limit,
    })
}

async fn binary_search_verification_gas<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
    max_gas: u64,
) -> anyhow::Result<U256>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let run_attempt_returning_error = |gas: u64| async move {
        let op = op
            .clone()
            .with_verification_gas_limit(gas.into())
            .with_call_gas_limit(U256::zero());
        let error_message = call_simulate_op(entry_point, &op).await?.err();
        anyhow::Ok(error_message)
    };

    // Make one attempt at max gas to see if success is possible.
    if let Some(message) = run_attempt_returning_error(max_gas).await? {
        bail!("validation reverted: {message}");
    }

    let mut scaled_max_failure_gas = 0;
    let mut scaled_min_success_gas = (max_gas + GAS_ROUNDING - 1) / GAS_ROUNDING;
    while scaled_min_success_gas - scaled_max_failure_gas > 1 {
        let scaled_guess = (scaled_max_failure_gas + scaled_min_success_gas) / 2;
        let is_failure = run_attempt_returning_error(scaled_guess * GAS_ROUNDING)
            .await?
            .is_some();
        if is_failure {
            scaled_max_failure_gas = scaled_guess;
        } else {
            scaled_min_success_gas = scaled_guess;
        }
    }
    Ok((scaled_min_success_gas * GAS_ROUNDING).min(max_gas).into())
}

async fn binary_search_call_gas<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
    max_gas: u64,
    tracer: ExecutionTracer,
) -> anyhow::Result<U256>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let run_attempt = |gas: u64| async move {
        let op = op.clone().with_call_gas_limit(gas.into());
        trace_simulate_op(entry_point, &op, tracer).await
    };

    let out = run_attempt(max_gas).await?;
    if out.validation_oog {
        bail!("validation out of gas during call gas estimation");
    }
    if out.execution_oog {
        bail!("user operation's call ran out of gas at {max_gas}");
    }
    if !out.reverts.is_empty() {
        bail!("user operation's call reverted: {}", out.reverts.join(", "));
    }
    if !out.error.is_empty() {
        bail!("bundler executor trace failed: {}", out.error);
    }

    let mut scaled_max_failure_gas = 0;
    let mut scaled_min_success_gas = (max_gas + GAS_ROUNDING - 1) / GAS_ROUNDING;
    while scaled_min_success_gas - scaled_max_failure_gas > 1 {
        let scaled_guess = (scaled_max_failure_gas + scaled_min_success_gas) / 2;
        let out = run_attempt(scaled_guess * GAS_ROUNDING).await?;
        if out.validation_oog {
            bail!("validation out of gas during call gas estimation");
        }
        if out.execution_oog {
            scaled_max_failure_gas = scaled_guess;
        } else {
            scaled_min_success_gas = scaled_guess;
        }
    }
    Ok((scaled_min_success_gas * GAS_ROUNDING).min(max_gas).into())
}

/// Estimates the account call as if the entry point made it directly.
async fn estimate_call_gas<M>(entry_point: &EntryPoint<M>, op: &UserOperation) -> anyhow::Result<U256>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let tx: TypedTransaction = TransactionRequest::new()
        .from(entry_point.address())
        .to(op.sender)
        .data(op.call_data.clone())
        .into();
    entry_point
        .client()
        .estimate_gas(&tx, None)
        .await
        .context("should estimate call gas")
}

/// Derives the call gas from the fee `simulateHandleOp` charges, with the
/// sender deployed by its initCode first.
///
/// eth_call runs with a zero base fee, so the charged price is
/// `min(maxFeePerGas, maxPriorityFeePerGas)`. A non-zero base fee can only
/// overestimate.
async fn simulate_call_gas<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
    max_gas: u64,
) -> anyhow::Result<U256>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let gas_price = op.max_fee_per_gas.min(op.max_priority_fee_per_gas);
    if gas_price.is_zero() {
        bail!("gas price is zero, cannot derive call gas from simulateHandleOp");
    }
    let op = op.clone().with_call_gas_limit(max_gas.into());
    let result = match call_simulate_op(entry_point, &op).await? {
        Ok(result) => result,
        Err(message) => bail!("simulateHandleOp reverted during call gas estimation: {message}"),
    };
    let call_gas = (result.paid / gas_price).saturating_sub(result.pre_op_gas);
    let scaled_call_gas = (call_gas + (GAS_ROUNDING - 1)) / GAS_ROUNDING;
    Ok((scaled_call_gas * GAS_ROUNDING).min(max_gas.into()))
}

async fn call_simulate_op<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
) -> anyhow::Result<Result<ExecutionResult, String>>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let error = entry_point
        .simulate_handle_op(op.into(), Address::zero(), Bytes::new())
        .call()
        .await
        .err()
        .context("simulateHandleOp should revert")?;
    let revert_data = match error {
        ContractError::Revert(revert_data) => revert_data,
        error => return Err(error).context("simulateHandleOp should revert"),
    };
    if let Ok(result) = ExecutionResult::decode(&revert_data) {
        Ok(Ok(result))
    } else if let Ok(failed_op) = FailedOp::decode(&revert_data) {
        Ok(Err(failed_op.reason))
    } else {
        Ok(Err(format!("unrecognized revert {revert_data}")))
    }
}

async fn trace_simulate_op<M>(
    entry_point: &EntryPoint<M>,
    op: &UserOperation,
    tracer: ExecutionTracer,
) -> anyhow::Result<ExecutorTracerOutput>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    let gas = op.verification_gas_limit + op.call_gas_limit + op.pre_verification_gas;
    let tx = entry_point
        .simulate_handle_op(op.into(), Address::zero(), Bytes::new())
        .gas(gas)
        .tx;
    entry_point
        .client()
        .provider()
        .request(
            "debug_traceCall",
            (
                tx,
                BlockNumber::Latest,
                serde_json::json!({ "tracer": tracer.name() }),
            ),
        )
        .await
        .context("failed to run bundler executor trace")
}
