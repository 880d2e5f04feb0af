//! RPC Request/Response Types

use serde::{Deserialize, Serialize};

/// Method executing one serialized job on the worker
pub const METHOD_INVOKE: &str = "jobs.invoke.v1";

/// jobs.invoke.v1 - Run a job under an operation
///
/// The result is the serialized job (a JSON string, not an object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub operation: String,
    /// Job as produced by the job codec
    pub job: String,
}
