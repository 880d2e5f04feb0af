// Job Domain Model

use super::audience::{Action, Audience};
use super::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Batch-local job id assigned by the runner (0-based, input order)
pub type JobId = usize;

/// Job Status
///
/// Transitions are monotonic: `PENDING -> RUNNING -> {COMPLETE | ERROR}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Complete => write!(f, "COMPLETE"),
            JobStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Discriminator of the closed job variant set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobVariant {
    Generic,
    AudienceLoad,
    AudienceProcess,
}

impl JobVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            JobVariant::Generic => "GENERIC",
            JobVariant::AudienceLoad => "AUDIENCE_LOAD",
            JobVariant::AudienceProcess => "AUDIENCE_PROCESS",
        }
    }
}

impl fmt::Display for JobVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant payload
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Container (or no-op) job; work lives in `children`
    Generic,
    /// Fetch and format one audience for display
    AudienceLoad { audience: Audience },
    /// Apply one or more remote mutations for this audience
    AudienceProcess {
        audience: Audience,
        actions: BTreeSet<Action>,
    },
}

impl JobKind {
    pub fn variant(&self) -> JobVariant {
        match self {
            JobKind::Generic => JobVariant::Generic,
            JobKind::AudienceLoad { .. } => JobVariant::AudienceLoad,
            JobKind::AudienceProcess { .. } => JobVariant::AudienceProcess,
        }
    }
}

/// Timestamped job log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Job Entity
///
/// The variant is fixed at construction; `kind` is only reachable through
/// accessors that cannot swap it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Stable position from creation (e.g. source row offset)
    pub index: usize,
    /// Number of log entries already consumed by an incremental writer
    pub offset: usize,
    pub children: Vec<Job>,
    status: JobStatus,
    logs: Vec<LogEntry>,
    error: String,
    kind: JobKind,
}

impl Job {
    fn with_kind(index: usize, kind: JobKind) -> Self {
        Self {
            id: 0,
            index,
            offset: 0,
            children: Vec::new(),
            status: JobStatus::Pending,
            logs: Vec::new(),
            error: String::new(),
            kind,
        }
    }

    /// Create a generic container job
    pub fn generic(index: usize, children: Vec<Job>) -> Self {
        let mut job = Self::with_kind(index, JobKind::Generic);
        job.children = children;
        job
    }

    pub fn audience_load(index: usize, audience: Audience) -> Self {
        Self::with_kind(index, JobKind::AudienceLoad { audience })
    }

    pub fn audience_process(index: usize, audience: Audience, actions: BTreeSet<Action>) -> Self {
        Self::with_kind(index, JobKind::AudienceProcess { audience, actions })
    }

    /// Rebuild a job from decoded wire fields (status and error are taken as-is)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: JobId,
        index: usize,
        offset: usize,
        status: JobStatus,
        logs: Vec<LogEntry>,
        error: String,
        children: Vec<Job>,
        kind: JobKind,
    ) -> Self {
        Self {
            id,
            index,
            offset,
            children,
            status,
            logs,
            error,
            kind,
        }
    }

    pub fn variant(&self) -> JobVariant {
        self.kind.variant()
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn is_error(&self) -> bool {
        self.status == JobStatus::Error
    }

    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }

    pub fn audience(&self) -> Option<&Audience> {
        match &self.kind {
            JobKind::Generic => None,
            JobKind::AudienceLoad { audience } | JobKind::AudienceProcess { audience, .. } => {
                Some(audience)
            }
        }
    }

    pub fn audience_mut(&mut self) -> Option<&mut Audience> {
        match &mut self.kind {
            JobKind::Generic => None,
            JobKind::AudienceLoad { audience } | JobKind::AudienceProcess { audience, .. } => {
                Some(audience)
            }
        }
    }

    /// Actions of a process job (empty for other variants)
    pub fn actions(&self) -> BTreeSet<Action> {
        match &self.kind {
            JobKind::AudienceProcess { actions, .. } => actions.clone(),
            _ => BTreeSet::new(),
        }
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn log(&mut self, timestamp: DateTime<Utc>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp,
            message: message.into(),
        });
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.offset = 0;
    }

    /// Transition PENDING -> RUNNING
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Pending, JobStatus::Running)
    }

    /// Transition RUNNING -> COMPLETE
    pub fn complete(&mut self) -> Result<()> {
        self.transition(JobStatus::Running, JobStatus::Complete)
    }

    /// Transition PENDING | RUNNING -> ERROR
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: JobStatus::Error.to_string(),
            });
        }
        self.status = JobStatus::Error;
        self.error = error.into();
        Ok(())
    }

    /// Apply the outcome reported across the remote boundary.
    ///
    /// The serialized status of a returned job may be stale, so the outcome
    /// (error or not) decides the terminal status.
    pub(crate) fn settle(&mut self, error: Option<String>) {
        match error {
            Some(error) => {
                self.status = JobStatus::Error;
                if self.error.is_empty() {
                    self.error = error;
                }
            }
            None if self.error.is_empty() => self.status = JobStatus::Complete,
            None => self.status = JobStatus::Error,
        }
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<()> {
        if self.status != from {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_job() -> Job {
        Job::audience_process(3, Audience::new("A"), BTreeSet::from([Action::Create]))
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = process_job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.variant(), JobVariant::AudienceProcess);

        job.start().unwrap();
        assert_eq!(job.status(), JobStatus::Running);

        job.complete().unwrap();
        assert!(job.is_complete());
        assert!(job.error().is_empty());
    }

    #[test]
    fn test_no_transition_out_of_terminal_state() {
        let mut job = process_job();
        job.start().unwrap();
        job.fail("boom").unwrap();

        assert!(job.is_error());
        assert_eq!(job.error(), "boom");
        assert!(job.start().is_err());
        assert!(job.complete().is_err());
        assert!(job.fail("again").is_err());
        assert_eq!(job.error(), "boom");
    }

    #[test]
    fn test_cannot_complete_without_start() {
        let mut job = process_job();
        assert!(job.complete().is_err());
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[test]
    fn test_pending_job_can_fail_directly() {
        let mut job = process_job();
        job.fail("invalid row").unwrap();
        assert!(job.is_error());
    }

    #[test]
    fn test_settle_forces_terminal_status() {
        let mut job = process_job();
        job.start().unwrap();
        job.settle(None);
        assert!(job.is_complete());

        let mut failed = process_job();
        failed.settle(Some("remote said no".to_string()));
        assert!(failed.is_error());
        assert_eq!(failed.error(), "remote said no");
    }

    #[test]
    fn test_logs_append_and_clear() {
        let mut job = Job::generic(0, Vec::new());
        let now = Utc::now();
        job.log(now, "first");
        job.log(now, "second");
        job.offset = 1;

        assert_eq!(job.logs().len(), 2);
        assert_eq!(job.logs()[1].message, "second");

        job.clear_logs();
        assert!(job.logs().is_empty());
        assert_eq!(job.offset, 0);
    }

    #[test]
    fn test_generic_job_has_no_audience() {
        let job = Job::generic(0, vec![process_job()]);
        assert!(job.audience().is_none());
        assert!(job.actions().is_empty());
        assert_eq!(job.children.len(), 1);
    }
}
