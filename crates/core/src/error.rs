// Central Error Type for the Application

use thiserror::Error;

/// One errored job of a batch, as surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Source row offset (the job's `index`)
    pub index: usize,
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} ({}): {}", self.index, self.name, self.message)
    }
}

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Remote API error: {0}")]
    Api(#[from] crate::port::ApiError),

    #[error("Remote invocation error: {0}")]
    Invoke(#[from] crate::port::InvokeError),

    #[error("{} job(s) failed: {}", failures.len(), join_failures(failures))]
    BatchFailed { failures: Vec<JobFailure> },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_failures(failures: &[JobFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failed_lists_every_failure() {
        let err = AppError::BatchFailed {
            failures: vec![
                JobFailure {
                    index: 2,
                    name: "A".to_string(),
                    message: "quota".to_string(),
                },
                JobFailure {
                    index: 5,
                    name: "B".to_string(),
                    message: "invalid rule".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 job(s) failed: row 2 (A): quota; row 5 (B): invalid rule"
        );
    }
}
