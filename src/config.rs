// src/config.rs
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use ethers::types::Address;

use crate::{estimator::MAX_GAS_LIMIT, registry::EntryPointRegistry};

#[derive(Parser, Debug)]
#[clap(author, version, about = "ERC-4337 verifying paymaster", long_about = None)]
pub struct Args {
    #[clap(long, env = "ERC4337_PAYMASTER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[clap(long, env = "ERC4337_PAYMASTER_PORT", default_value_t = 43371)]
    pub port: u16,

    /// Target of the L1 data-cost calls made on rollups.
    #[clap(
        long,
        env = "ERC4337_PAYMASTER_DEFAULT_ENTRYPOINT",
        default_value = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"
    )]
    pub default_entry_point: Address,

    #[clap(long, env = "ERC4337_PAYMASTER_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: String,

    /// `entryPoint=paymaster1,paymaster2&entryPoint2=paymaster3`
    #[clap(long, env = "ERC4337_PAYMASTER_ENTRYPOINT_TO_PAYMASTERS")]
    pub entrypoint_to_paymasters: EntryPointRegistry,

    #[clap(long, env = "ERC4337_PAYMASTER_ETH_CLIENT_URL")]
    pub eth_client_url: String,

    #[clap(long, env = "ERC4337_PAYMASTER_IS_OP_STACK_NETWORK")]
    pub is_op_stack_network: bool,

    #[clap(long, env = "ERC4337_PAYMASTER_IS_ARB_STACK_NETWORK")]
    pub is_arb_stack_network: bool,

    /// The node exposes the native `bundlerExecutorTracer`.
    #[clap(long, env = "ERC4337_PAYMASTER_NATIVE_TRACER")]
    pub native_tracer: bool,

    #[clap(long, env = "ERC4337_PAYMASTER_MAX_GAS_LIMIT", default_value_t = MAX_GAS_LIMIT)]
    pub max_gas_limit: u64,
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
