//! RPC Error Types
//!
//! Maps application and job failures to JSON-RPC error codes.

use audiencesync_core::application::ExecutionFailure;
use audiencesync_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    /// The job ran and failed; the message is the serialized job
    pub const JOB_FAILED: i32 = 4100;
    pub const INTERNAL_ERROR: i32 = 5000;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::Domain(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        AppError::Serialization(e) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, e.to_string(), None::<()>)
        }
        other => ErrorObjectOwned::owned(code::INTERNAL_ERROR, other.to_string(), None::<()>),
    }
}

/// Convert an executor failure to JSON-RPC ErrorObject
pub fn from_execution_failure(failure: ExecutionFailure) -> ErrorObjectOwned {
    match failure {
        ExecutionFailure::InvalidPayload(e) => to_rpc_error(e),
        ExecutionFailure::JobFailed(serialized_job) => {
            ErrorObjectOwned::owned(code::JOB_FAILED, serialized_job, None::<()>)
        }
    }
}
