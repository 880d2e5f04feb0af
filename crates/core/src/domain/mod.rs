// Domain Layer - Pure business logic and entities

pub mod audience;
pub mod error;
pub mod job;
pub mod rule;

// Re-exports
pub use audience::{Action, Audience, AudienceRule};
pub use error::DomainError;
pub use job::{Job, JobId, JobKind, JobStatus, JobVariant, LogEntry};
pub use rule::{Clause, PopulationRule, Term, TermType, VariableName};
