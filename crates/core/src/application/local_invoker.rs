// In-process invoker: same wire format as the RPC worker, no network hop

use super::executor::JobExecutor;
use crate::port::{InvokeError, RemoteInvoker};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs jobs on a local [`JobExecutor`], still round-tripping them through JSON
pub struct LocalInvoker {
    executor: Arc<JobExecutor>,
}

impl LocalInvoker {
    pub fn new(executor: Arc<JobExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl RemoteInvoker for LocalInvoker {
    async fn invoke(&self, operation: &str, serialized_job: String) -> Result<String, InvokeError> {
        self.executor
            .execute_serialized(operation, &serialized_job)
            .await
            .map_err(|e| InvokeError::new(e.to_string()))
    }
}
