// src/chain/mod.rs
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes,
        Eip1559TransactionRequest, U256,
    },
};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::{
    contracts::{
        entry_point::EntryPoint, gas_price_oracle::GasPriceOracle,
        node_interface::NodeInterface, verifying_paymaster::VerifyingPaymaster,
        GAS_PRICE_ORACLE_ADDRESS, NODE_INTERFACE_ADDRESS,
    },
    gas::{NetworkFamily, Overhead},
    paymaster_data::PaymasterData,
    types::UserOperation,
};

mod estimation;

/// Node-side tracer used for tighter gas bounds when the node provides it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionTracer {
    BundlerExecutor,
}

impl ExecutionTracer {
    pub fn name(self) -> &'static str {
        match self {
            Self::BundlerExecutor => "bundlerExecutorTracer",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasLimits {
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

/// Everything the sponsorship pipeline reads from the chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Digest the paymaster contract will verify for `op` under `data`.
    async fn get_hash(&self, op: &UserOperation, data: &PaymasterData) -> anyhow::Result<[u8; 32]>;

    async fn estimate_gas(
        &self,
        entry_point: Address,
        op: &UserOperation,
        overhead: &Overhead,
        max_gas_limit: U256,
        tracer: Option<ExecutionTracer>,
    ) -> anyhow::Result<GasLimits>;

    /// Pre-verification gas including any L1 data surcharge and the buffer.
    async fn calc_pre_verification_gas(
        &self,
        op: &UserOperation,
        overhead: &Overhead,
    ) -> anyhow::Result<U256>;
}

#[derive(Debug)]
pub struct EthChainClient<M> {
    provider: Arc<M>,
    chain_id: u64,
    default_entry_point: Address,
}

impl<M> EthChainClient<M>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    pub async fn connect(provider: Arc<M>, default_entry_point: Address) -> anyhow::Result<Self> {
        let chain_id = provider
            .get_chainid()
            .await
            .context("should fetch chain id")?
            .as_u64();
        Ok(Self {
            provider,
            chain_id,
            default_entry_point,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn handle_ops_calldata(&self, op: &UserOperation) -> anyhow::Result<Bytes> {
        let entry_point = EntryPoint::new(self.default_entry_point, Arc::clone(&self.provider));
        entry_point
            .handle_ops(vec![op.into()], Address::repeat_byte(0x01))
            .calldata()
            .context("handleOps calldata should encode")
    }

    async fn arbitrum_l1_gas(&self, op: &UserOperation) -> anyhow::Result<U256> {
        let data = self.handle_ops_calldata(op)?;
        let node_interface = NodeInterface::new(NODE_INTERFACE_ADDRESS, Arc::clone(&self.provider));
        let (gas_estimate_for_l1, _, _) = node_interface
            .gas_estimate_l1_component(self.default_entry_point, false, data)
            .call()
            .await
            .context("NodeInterface should estimate L1 gas")?;
        Ok(U256::from(gas_estimate_for_l1))
    }

    async fn optimism_l1_gas(&self, op: &UserOperation) -> anyhow::Result<U256> {
        let data = self.handle_ops_calldata(op)?;
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .to(self.default_entry_point)
            .data(data)
            .chain_id(self.chain_id)
            .max_fee_per_gas(op.max_fee_per_gas)
            .max_priority_fee_per_gas(op.max_priority_fee_per_gas)
            .into();

        let oracle = GasPriceOracle::new(GAS_PRICE_ORACLE_ADDRESS, Arc::clone(&self.provider));
        let l1_fee = oracle
            .get_l1_fee(tx.rlp())
            .call()
            .await
            .context("GasPriceOracle should return L1 fee")?;
        let base_fee = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .context("should load latest block")?
            .context("latest block should exist")?
            .base_fee_per_gas
            .unwrap_or_default();

        let l2_price = op
            .max_fee_per_gas
            .min(base_fee + op.max_priority_fee_per_gas);
        if l2_price.is_zero() {
            bail!("L2 gas price is zero, cannot convert L1 fee to gas");
        }
        Ok(l1_fee / l2_price)
    }
}

#[async_trait]
impl<M> ChainClient for EthChainClient<M>
where
    M: Middleware + 'static,
    M::Error: 'static,
{
    async fn get_hash(&self, op: &UserOperation, data: &PaymasterData) -> anyhow::Result<[u8; 32]> {
        let paymaster = VerifyingPaymaster::new(data.paymaster, Arc::clone(&self.provider));
        paymaster
            .get_hash(
                op.into(),
                data.valid_until,
                data.valid_after,
                data.erc20_token,
                data.exchange_rate,
            )
            .call()
            .await
            .context("paymaster should return hash")
    }

    async fn estimate_gas(
        &self,
        entry_point: Address,
        op: &UserOperation,
        overhead: &Overhead,
        max_gas_limit: U256,
        tracer: Option<ExecutionTracer>,
    ) -> anyhow::Result<GasLimits> {
        let entry_point = EntryPoint::new(entry_point, Arc::clone(&self.provider));
        estimation::estimate_gas(&entry_point, op, overhead, max_gas_limit, tracer).await
    }

    async fn calc_pre_verification_gas(
        &self,
        op: &UserOperation,
        overhead: &Overhead,
    ) -> anyhow::Result<U256> {
        let static_gas = overhead.static_pre_verification_gas(op);
        let l1_gas = match overhead.family() {
            NetworkFamily::Default => U256::zero(),
            NetworkFamily::Arbitrum => self.arbitrum_l1_gas(op).await?,
            NetworkFamily::Optimism => self.optimism_l1_gas(op).await?,
        };
        debug!(%static_gas, %l1_gas, family = %overhead.family(), "calculated pre-verification gas");
        Ok(overhead.with_buffer(static_gas + l1_gas))
    }
}
