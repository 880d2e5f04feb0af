//! JSON-RPC Server
//!
//! Worker endpoint over HTTP on localhost.

use crate::handler::RpcHandler;
use crate::types::{InvokeRequest, METHOD_INVOKE};
use audiencesync_core::application::JobExecutor;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9537;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

impl RpcServerConfig {
    /// Defaults overridden by `AUDIENCESYNC_RPC_HOST` / `AUDIENCESYNC_RPC_PORT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("AUDIENCESYNC_RPC_HOST").unwrap_or(defaults.host),
            port: std::env::var("AUDIENCESYNC_RPC_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, executor: Arc<JobExecutor>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(executor)),
        }
    }

    /// Start the JSON-RPC server; returns the bound address and its handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method(METHOD_INVOKE, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Positional `[request]` or named `{operation, job}`
                    let req: InvokeRequest = match params.one() {
                        Ok(req) => req,
                        Err(_) => params.parse()?,
                    };
                    handler.invoke(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, method = METHOD_INVOKE, "JSON-RPC worker endpoint started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}
