// Application Layer - Use Cases and Business Logic

pub mod checksum;
pub mod config;
pub mod constants;
pub mod controller;
pub mod executor;
pub mod job_codec;
pub mod local_invoker;
pub mod log_writer;
pub mod planner;
pub mod retry;
pub mod rule_codec;
pub mod runner;

// Re-exports
pub use checksum::ChecksumEngine;
pub use config::SyncConfig;
pub use controller::{AudiencesController, LoadReport, SyncReport};
pub use executor::{ExecutionFailure, JobExecutor};
pub use local_invoker::LocalInvoker;
pub use log_writer::JobLogWriter;
pub use planner::{ActionPlanner, StoredState};
pub use retry::{RetryDecision, RetryPolicy};
pub use rule_codec::RuleCodec;
pub use runner::{Runner, RunnerState};
