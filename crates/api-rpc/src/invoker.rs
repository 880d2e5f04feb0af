//! RPC Invoker
//!
//! Remote invocation boundary backed by the worker's `jobs.invoke.v1` method.

use crate::types::{InvokeRequest, METHOD_INVOKE};
use async_trait::async_trait;
use audiencesync_core::port::{InvokeError, RemoteInvoker};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::time::Duration;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Dispatches serialized jobs to a remote worker
pub struct RpcInvoker {
    client: HttpClient,
}

impl RpcInvoker {
    /// Connect to a worker endpoint (e.g. `http://127.0.0.1:9537`)
    pub fn connect(url: impl AsRef<str>) -> Result<Self, InvokeError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: impl AsRef<str>, timeout: Duration) -> Result<Self, InvokeError> {
        let url = url.as_ref();
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| InvokeError::new(format!("Failed to create client for {}: {}", url, e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteInvoker for RpcInvoker {
    async fn invoke(&self, operation: &str, serialized_job: String) -> Result<String, InvokeError> {
        let request = InvokeRequest {
            operation: operation.to_string(),
            job: serialized_job,
        };
        debug!(operation = %operation, "Sending job to worker");

        self.client
            .request::<String, _>(METHOD_INVOKE, rpc_params![request])
            .await
            .map_err(|e| match e {
                // Job failures carry the serialized job as message
                ClientError::Call(call_err) => InvokeError::new(call_err.message()),
                other => InvokeError::new(format!("Transport error: {}", other)),
            })
    }
}
