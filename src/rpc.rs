// src/rpc.rs
use std::{net::SocketAddr, sync::Arc};

use jsonrpsee::{
    core::{async_trait, RpcResult},
    proc_macros::rpc,
    server::{middleware::http::ProxyGetRequestLayer, Server, ServerHandle},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::{paymaster::Paymaster, types::SponsorUserOperationResponse};

#[rpc(server, namespace = "pm")]
pub trait PaymasterApi {
    /// Paymaster addresses registered for an entry point.
    #[method(name = "accounts")]
    async fn accounts(&self, entry_point: String) -> RpcResult<Vec<String>>;

    /// Estimates gas for a user operation and signs the paymaster's approval.
    #[method(name = "sponsorUserOperation")]
    async fn sponsor_user_operation(
        &self,
        user_op: Value,
        entry_point: String,
        ctx: Option<Value>,
    ) -> RpcResult<SponsorUserOperationResponse>;
}

#[rpc(server, namespace = "system")]
pub trait SystemApi {
    #[method(name = "health")]
    async fn health(&self) -> RpcResult<String>;
}

pub struct PaymasterApiImpl {
    paymaster: Arc<Paymaster>,
}

impl PaymasterApiImpl {
    pub fn new(paymaster: Arc<Paymaster>) -> Self {
        Self { paymaster }
    }
}

#[async_trait]
impl PaymasterApiServer for PaymasterApiImpl {
    async fn accounts(&self, entry_point: String) -> RpcResult<Vec<String>> {
        self.paymaster.accounts(&entry_point).map_err(Into::into)
    }

    async fn sponsor_user_operation(
        &self,
        user_op: Value,
        entry_point: String,
        ctx: Option<Value>,
    ) -> RpcResult<SponsorUserOperationResponse> {
        // A missing context decodes like an empty one and fails on `type`.
        let context = ctx.unwrap_or_else(|| Value::Object(Default::default()));
        self.paymaster
            .sponsor_user_operation(user_op, &entry_point, context)
            .await
            .map_err(Into::into)
    }
}

pub struct SystemApiImpl;

#[async_trait]
impl SystemApiServer for SystemApiImpl {
    async fn health(&self) -> RpcResult<String> {
        Ok("ok".to_string())
    }
}

pub async fn start_server(addr: SocketAddr, paymaster: Arc<Paymaster>) -> anyhow::Result<ServerHandle> {
    let mut module = PaymasterApiImpl::new(paymaster).into_rpc();
    module.merge(SystemApiImpl.into_rpc())?;

    // Proxy `GET /ping` requests to the internal `system_health` method.
    let middleware = ServiceBuilder::new()
        .layer(CorsLayer::permissive())
        .layer(ProxyGetRequestLayer::new("/ping", "system_health")?);

    let server = Server::builder()
        .set_http_middleware(middleware)
        .build(addr)
        .await?;
    Ok(server.start(module))
}
