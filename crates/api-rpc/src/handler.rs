//! RPC Method Handlers

use crate::error::{from_execution_failure, to_rpc_error};
use crate::types::InvokeRequest;
use audiencesync_core::application::JobExecutor;
use audiencesync_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    executor: Arc<JobExecutor>,
}

impl RpcHandler {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }

    /// jobs.invoke.v1
    pub async fn invoke(&self, params: InvokeRequest) -> Result<String, ErrorObjectOwned> {
        if params.operation.trim().is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "operation is required".to_string(),
            )));
        }

        debug!(operation = %params.operation, bytes = params.job.len(), "Invoking job");
        self.executor
            .execute_serialized(&params.operation, &params.job)
            .await
            .map_err(|failure| {
                warn!(operation = %params.operation, error = %failure, "Invocation failed");
                from_execution_failure(failure)
            })
    }
}
