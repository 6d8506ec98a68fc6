// src/main.rs
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Provider};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod chain;
mod config;
mod contracts;
mod decode;
mod error;
mod estimator;
mod gas;
mod handlers;
mod paymaster;
mod paymaster_data;
mod registry;
mod rpc;
mod signer;
mod types;

use crate::{
    chain::EthChainClient,
    config::Args,
    estimator::GasEstimator,
    gas::{NetworkFamily, Overhead},
    handlers::{payg::PaygHandler, StrategyKind, Strategies},
    paymaster::Paymaster,
    signer::{LocalSigner, PaymasterSigner},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let signer = Arc::new(LocalSigner::new(&args.signing_key)?);
    let provider = Arc::new(Provider::<Http>::try_from(args.eth_client_url.as_str())?);
    let chain = Arc::new(EthChainClient::connect(provider, args.default_entry_point).await?);
    let chain_id = chain.chain_id();
    let family = NetworkFamily::detect(chain_id, args.is_arb_stack_network, args.is_op_stack_network);
    let overhead = Overhead::new(family);
    info!(
        signer = ?signer.address(),
        chain_id,
        %family,
        buffer_factor = overhead.buffer_factor(),
        native_tracer = args.native_tracer,
        entry_points = ?args.entrypoint_to_paymasters.entry_points().collect::<Vec<_>>(),
        "initialized paymaster"
    );

    let estimator = GasEstimator::new(
        Arc::clone(&chain),
        Arc::clone(&signer),
        overhead,
        args.native_tracer,
        args.max_gas_limit.into(),
    );
    let payg = PaygHandler::new(Arc::clone(&chain), Arc::clone(&signer), estimator);
    let strategies = Strategies::new().register(StrategyKind::Payg, Arc::new(payg));
    let paymaster = Arc::new(Paymaster::new(
        args.entrypoint_to_paymasters.clone(),
        strategies,
        chain_id,
    ));

    let addr = args.listen_addr();
    let handle = rpc::start_server(addr, paymaster).await?;
    info!(%addr, "started paymaster RPC server");

    tokio::signal::ctrl_c().await?;
    handle.stop()?;
    handle.stopped().await;
    info!("server stopped");

    Ok(())
}
