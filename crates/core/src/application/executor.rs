//! Job Executor - worker side of the invocation boundary
//!
//! Executes one decoded job against the remarketing API and reports it back
//! COMPLETE or ERROR. Every step is appended to the job's own log so the
//! caller can replay progress after the round trip. Remote calls go through
//! the retry policy; the dispatcher only ever sees the terminal outcome.

use super::config::SyncConfig;
use super::constants::{OP_LOAD_AUDIENCES, OP_PROCESS_AUDIENCES, OP_RUN_JOBS};
use super::job_codec;
use super::retry::RetryPolicy;
use super::rule_codec::RuleCodec;
use crate::domain::{Action, Audience, Job, JobStatus, JobVariant};
use crate::error::AppError;
use crate::port::{RemarketingApi, RemarketingListShares, TimeProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of [`JobExecutor::execute_serialized`]
#[derive(Error, Debug)]
pub enum ExecutionFailure {
    /// The payload could not be decoded into a job
    #[error("invalid job payload: {0}")]
    InvalidPayload(#[source] AppError),

    /// The job ran and ended in ERROR; carries the serialized job
    #[error("{0}")]
    JobFailed(String),
}

pub struct JobExecutor {
    api: Arc<dyn RemarketingApi>,
    codec: RuleCodec,
    retry: RetryPolicy,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobExecutor {
    pub fn new(
        api: Arc<dyn RemarketingApi>,
        codec: RuleCodec,
        retry: RetryPolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            api,
            codec,
            retry,
            time_provider,
        }
    }

    pub fn from_config(
        api: Arc<dyn RemarketingApi>,
        config: &SyncConfig,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::new(
            api,
            RuleCodec::new(config.rule_value_separator.clone()),
            RetryPolicy::new(config.max_retries, config.retry_base_delay()),
            time_provider,
        )
    }

    /// Execute a job; `Err` carries the job in ERROR status
    pub async fn execute(&self, operation: &str, mut job: Job) -> Result<Job, Job> {
        self.execute_in_place(operation, &mut job).await;
        if job.is_error() {
            Err(job)
        } else {
            Ok(job)
        }
    }

    /// Decode, execute and re-encode one serialized job
    pub async fn execute_serialized(
        &self,
        operation: &str,
        serialized_job: &str,
    ) -> Result<String, ExecutionFailure> {
        let job = job_codec::decode(serialized_job).map_err(ExecutionFailure::InvalidPayload)?;

        match self.execute(operation, job).await {
            Ok(job) => job_codec::encode(&job).map_err(ExecutionFailure::InvalidPayload),
            Err(job) => {
                let payload = job_codec::encode(&job).unwrap_or_else(|_| job.error().to_string());
                Err(ExecutionFailure::JobFailed(payload))
            }
        }
    }

    fn execute_in_place<'a>(&'a self, operation: &'a str, job: &'a mut Job) -> BoxFuture<'a, ()> {
        async move {
            if job.status() == JobStatus::Pending {
                if let Err(e) = job.start() {
                    warn!(index = job.index, error = %e, "Job could not start");
                }
            }
            if job.status() != JobStatus::Running {
                debug!(index = job.index, status = %job.status(), "Skipping job not in RUNNING state");
                return;
            }

            match self.run(operation, job).await {
                Ok(()) => {
                    if let Err(e) = job.complete() {
                        warn!(index = job.index, error = %e, "Job could not complete");
                    }
                }
                Err(message) => {
                    warn!(
                        index = job.index,
                        variant = %job.variant(),
                        error = %message,
                        "Job failed"
                    );
                    self.log(job, format!("Failed: {}", message));
                    if let Err(e) = job.fail(message) {
                        warn!(index = job.index, error = %e, "Job could not be marked failed");
                    }
                }
            }
        }
        .boxed()
    }

    async fn run(&self, operation: &str, job: &mut Job) -> Result<(), String> {
        if ![OP_PROCESS_AUDIENCES, OP_LOAD_AUDIENCES, OP_RUN_JOBS].contains(&operation) {
            return Err(format!("unknown operation '{}'", operation));
        }

        match job.variant() {
            JobVariant::Generic => self.run_children(operation, job).await,
            JobVariant::AudienceLoad => self.load(job).await,
            JobVariant::AudienceProcess => self.process(job).await,
        }
    }

    async fn run_children(&self, operation: &str, job: &mut Job) -> Result<(), String> {
        let total = job.children.len();
        for child in job.children.iter_mut() {
            self.execute_in_place(operation, child).await;
        }

        let failed = job.children.iter().filter(|child| child.is_error()).count();
        if failed > 0 {
            return Err(format!("{} of {} child job(s) failed", failed, total));
        }
        self.log(job, format!("Ran {} child job(s)", total));
        Ok(())
    }

    async fn process(&self, job: &mut Job) -> Result<(), String> {
        let actions = job.actions();
        let mut audience = job
            .audience()
            .cloned()
            .ok_or_else(|| "process job without audience".to_string())?;

        if actions.contains(&Action::Create) {
            self.create(job, &mut audience).await?;
        } else if actions.contains(&Action::Update) {
            self.update(job, &audience).await?;
        }

        if actions.contains(&Action::UpdateShares) {
            self.update_shares(job, &audience).await?;
        }
        Ok(())
    }

    async fn create(&self, job: &mut Job, audience: &mut Audience) -> Result<(), String> {
        let mut list = self.codec.to_remarketing_list(audience);
        list.id = None;
        // Only an id returned by this create may remain on the job
        if let Some(slot) = job.audience_mut() {
            slot.id = None;
        }

        let created = self
            .retry
            .call("create_remarketing_list", || {
                self.api.create_remarketing_list(&list)
            })
            .await
            .map_err(|e| e.to_string())?;
        let id = created
            .id
            .ok_or_else(|| "created list carries no id".to_string())?;

        info!(index = job.index, list_id = %id, name = %audience.name, "Created remarketing list");
        audience.id = Some(id.clone());
        // Keep the id on the job so a later failure still reports it
        if let Some(slot) = job.audience_mut() {
            slot.id = Some(id.clone());
        }
        self.log(job, format!("Created audience {} ({})", audience.name, id));
        Ok(())
    }

    async fn update(&self, job: &mut Job, audience: &Audience) -> Result<(), String> {
        let id = require_id(audience)?;
        let list = self.codec.to_remarketing_list(audience);

        self.retry
            .call("update_remarketing_list", || {
                self.api.update_remarketing_list(&list)
            })
            .await
            .map_err(|e| e.to_string())?;

        info!(index = job.index, list_id = %id, "Updated remarketing list");
        self.log(job, format!("Updated audience {} ({})", audience.name, id));
        Ok(())
    }

    async fn update_shares(&self, job: &mut Job, audience: &Audience) -> Result<(), String> {
        let id = require_id(audience)?;

        let current = self
            .retry
            .call("get_remarketing_list_shares", || {
                self.api.get_remarketing_list_shares(id)
            })
            .await
            .map_err(|e| e.to_string())?;
        let shares = RemarketingListShares {
            remarketing_list_id: id.to_string(),
            shared_account_ids: audience.shares.iter().cloned().collect(),
            ..current
        };

        self.retry
            .call("update_remarketing_list_shares", || {
                self.api.update_remarketing_list_shares(id, &shares)
            })
            .await
            .map_err(|e| e.to_string())?;

        info!(index = job.index, list_id = %id, shares = shares.shared_account_ids.len(), "Updated shares");
        self.log(
            job,
            format!(
                "Shared audience {} with {} account(s)",
                id,
                shares.shared_account_ids.len()
            ),
        );
        Ok(())
    }

    async fn load(&self, job: &mut Job) -> Result<(), String> {
        let id = job
            .audience()
            .map(require_id)
            .transpose()?
            .map(str::to_string)
            .ok_or_else(|| "load job without audience".to_string())?;

        let shares = self
            .retry
            .call("get_remarketing_list_shares", || {
                self.api.get_remarketing_list_shares(&id)
            })
            .await
            .map_err(|e| e.to_string())?;

        let count = shares.shared_account_ids.len();
        if let Some(audience) = job.audience_mut() {
            audience.shares = shares.shared_account_ids.into_iter().collect();
        }
        self.log(job, format!("Loaded {} share(s) for audience {}", count, id));
        Ok(())
    }

    fn log(&self, job: &mut Job, message: String) {
        job.log(self.time_provider.now(), message);
    }
}

fn require_id(audience: &Audience) -> Result<&str, String> {
    audience
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| format!("audience '{}' has no remote id", audience.name))
}
