// Remote Invoker Port
// The RPC boundary the runner dispatches serialized jobs across

use async_trait::async_trait;
use thiserror::Error;

/// Failure channel of a remote invocation.
///
/// When the worker got far enough to produce one, `message` is the JSON of the
/// partially updated job so its state can still be recovered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Remote Invoker trait
///
/// Implementations:
/// - LocalInvoker: runs the job executor in-process (still round-trips JSON)
/// - RpcInvoker: JSON-RPC call to a worker endpoint
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    /// Run `serialized_job` under `operation` and return the serialized result.
    async fn invoke(&self, operation: &str, serialized_job: String)
        -> Result<String, InvokeError>;
}
