//! Audiences Controller - table <-> remote sync flows
//!
//! Built once per batch with every collaborator injected; holds no global
//! state. `push_audiences` plans and applies local edits, `load_audiences`
//! replaces the sheets with what the remote account holds.

pub mod rows;

use self::rows::{
    AudienceRow, RuleIndex, AUDIENCE_COLUMNS, COL_STATUS, RULE_COLUMNS, RULE_COL_AUDIENCE,
};
use super::checksum::ChecksumEngine;
use super::config::SyncConfig;
use super::constants::{OP_LOAD_AUDIENCES, OP_PROCESS_AUDIENCES};
use super::log_writer::JobLogWriter;
use super::planner::{ActionPlanner, StoredState};
use super::retry::RetryPolicy;
use super::rule_codec::RuleCodec;
use super::runner::Runner;
use crate::domain::{Action, Audience, Job, VariableName};
use crate::error::{AppError, JobFailure, Result};
use crate::port::{CellRange, LogSink, RemarketingApi, RemoteInvoker, TableStore, TimeProvider};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a successful push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Rows that needed at least one action
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub shares_updated: usize,
    /// Rows skipped because nothing changed
    pub unchanged: usize,
}

/// Outcome of a successful load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub audiences: usize,
    pub rules: usize,
}

pub struct AudiencesController {
    config: SyncConfig,
    store: Arc<dyn TableStore>,
    api: Arc<dyn RemarketingApi>,
    runner: Runner,
    planner: ActionPlanner,
    codec: RuleCodec,
    retry: RetryPolicy,
    log_writer: JobLogWriter,
    time_provider: Arc<dyn TimeProvider>,
}

impl AudiencesController {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn TableStore>,
        api: Arc<dyn RemarketingApi>,
        invoker: Arc<dyn RemoteInvoker>,
        log_sink: Arc<dyn LogSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            runner: Runner::new(invoker, config.max_concurrency),
            planner: ActionPlanner::new(ChecksumEngine::new())
                .with_refresh_after_days(config.refresh_after_days),
            codec: RuleCodec::new(config.rule_value_separator.clone()),
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay()),
            log_writer: JobLogWriter::new(log_sink),
            config,
            store,
            api,
            time_provider,
        }
    }

    fn checksums(&self) -> &ChecksumEngine {
        self.planner.checksums()
    }

    /// Push every changed audience row to the remote account.
    ///
    /// Rows that fail (including rows that could not be read) are written with
    /// an error status and reported together as `AppError::BatchFailed` once
    /// every other row has been written back.
    pub async fn push_audiences(&self) -> Result<SyncReport> {
        let header = self.config.header_rows;
        let audience_rows = self
            .store
            .read_rows(&self.config.audience_sheet, header)
            .await?;
        let rule_rows = self.store.read_rows(&self.config.rule_sheet, header).await?;
        let rules = RuleIndex::from_rows(&rule_rows, header);

        let now = self.time_provider.now();
        let mut report = SyncReport::default();
        let mut jobs = Vec::new();

        for (offset, row) in audience_rows.iter().enumerate() {
            if rows::is_blank(row) {
                continue;
            }
            let sheet_row = header + offset;

            match rows::parse_audience_row(sheet_row, row, &rules) {
                Ok(parsed) => {
                    let actions = self.plan(&parsed, now);
                    if actions.is_empty() {
                        report.unchanged += 1;
                        continue;
                    }
                    jobs.push(Job::audience_process(sheet_row, parsed.audience, actions));
                }
                Err(e) => {
                    warn!(row = sheet_row, error = %e, "Unreadable audience row");
                    let name = row.get(rows::COL_NAME).cloned().unwrap_or_default();
                    let mut job =
                        Job::audience_process(sheet_row, Audience::new(name), BTreeSet::new());
                    job.fail(e.to_string())?;
                    jobs.push(job);
                }
            }
        }

        report.processed = jobs.len();
        info!(
            changed = report.processed,
            unchanged = report.unchanged,
            "Pushing audiences"
        );

        let writer = self.log_writer.clone();
        let results = self
            .runner
            .run_with_progress(OP_PROCESS_AUDIENCES, jobs, move |job| {
                writer.write(job);
            })
            .await?;

        let finished_at = self.time_provider.now();
        let mut failures = Vec::new();
        for job in &results {
            let Some(audience) = job.audience() else {
                continue;
            };
            let actions = job.actions();
            let created_id = audience
                .id
                .as_deref()
                .filter(|_| actions.contains(&Action::Create));

            if job.is_error() {
                failures.push(failure(job, audience));
                match created_id {
                    Some(id) => {
                        self.write_partially_synced_row(job, audience, id, finished_at)
                            .await?;
                        self.relink_rules(&audience.name, id).await?;
                    }
                    None => {
                        self.store
                            .write_row(
                                &self.config.audience_sheet,
                                job.index,
                                COL_STATUS,
                                vec![rows::error_status(finished_at, job.error())],
                            )
                            .await?;
                    }
                }
                continue;
            }

            self.write_synced_row(job.index, audience, finished_at).await?;

            if actions.contains(&Action::Create) {
                report.created += 1;
                if let Some(id) = created_id {
                    self.relink_rules(&audience.name, id).await?;
                }
            }
            if actions.contains(&Action::Update) {
                report.updated += 1;
            }
            if actions.contains(&Action::UpdateShares) {
                report.shares_updated += 1;
            }
        }

        finish(report, failures)
    }

    /// Replace both sheets with the audiences of the remote account.
    ///
    /// `variables` resolves friendly labels for rule variables.
    pub async fn load_audiences(&self, variables: &[VariableName]) -> Result<LoadReport> {
        let lists = self
            .retry
            .call("get_remarketing_lists", || self.api.get_remarketing_lists())
            .await?;

        let header = self.config.header_rows;
        self.store
            .clear_range(
                &self.config.audience_sheet,
                CellRange::rows_from(header, AUDIENCE_COLUMNS),
            )
            .await?;
        self.store
            .clear_range(
                &self.config.rule_sheet,
                CellRange::rows_from(header, RULE_COLUMNS),
            )
            .await?;

        let jobs: Vec<Job> = lists
            .iter()
            .enumerate()
            .map(|(offset, list)| {
                Job::audience_load(
                    header + offset,
                    self.codec.from_remarketing_list(list, variables),
                )
            })
            .collect();
        info!(audiences = jobs.len(), "Loading audiences");

        let writer = self.log_writer.clone();
        let results = self
            .runner
            .run_with_progress(OP_LOAD_AUDIENCES, jobs, move |job| {
                writer.write(job);
            })
            .await?;

        let finished_at = self.time_provider.now();
        let mut report = LoadReport::default();
        let mut failures = Vec::new();
        let mut rule_row = header;

        for job in &results {
            let Some(audience) = job.audience() else {
                continue;
            };

            if job.is_error() {
                failures.push(failure(job, audience));
                // Shares are unknown; leave their checksum empty so content stays in sync
                let row = rows::format_audience_row(
                    audience,
                    rows::error_status(finished_at, job.error()),
                    self.checksums().content_checksum(audience),
                    String::new(),
                )?;
                self.store
                    .write_row(&self.config.audience_sheet, job.index, 0, row)
                    .await?;
            } else {
                self.write_synced_row(job.index, audience, finished_at)
                    .await?;
            }
            report.audiences += 1;

            let audience_ref = audience.id.as_deref().unwrap_or(&audience.name);
            for rule in &audience.rules {
                self.store
                    .write_row(
                        &self.config.rule_sheet,
                        rule_row,
                        0,
                        rows::format_rule_row(audience_ref, rule),
                    )
                    .await?;
                rule_row += 1;
                report.rules += 1;
            }
        }

        finish(report, failures)
    }

    fn plan(&self, row: &AudienceRow, now: chrono::DateTime<chrono::Utc>) -> BTreeSet<Action> {
        let stored = StoredState {
            content_checksum: row.content_checksum.as_deref(),
            shares_checksum: row.shares_checksum.as_deref(),
            last_synced: row.last_synced,
        };
        self.planner.plan(&stored, &row.audience, now)
    }

    /// Rule rows referenced the audience by name until its creation
    async fn relink_rules(&self, name: &str, id: &str) -> Result<()> {
        let references = CellRange {
            first_row: self.config.header_rows,
            first_column: RULE_COL_AUDIENCE,
            rows: None,
            columns: 1,
        };
        self.store
            .find_replace(&self.config.rule_sheet, references, name, id)
            .await?;
        Ok(())
    }

    /// The list exists remotely but a later step failed: keep its id and content
    /// checksum so the next push does not create it again, and leave the shares
    /// checksum empty so the shares are retried.
    async fn write_partially_synced_row(
        &self,
        job: &Job,
        audience: &Audience,
        id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let message = format!("{} (created as {})", job.error(), id);
        let row = rows::format_audience_row(
            audience,
            rows::error_status(at, &message),
            self.checksums().content_checksum(audience),
            String::new(),
        )?;
        self.store
            .write_row(&self.config.audience_sheet, job.index, 0, row)
            .await
    }

    /// Full row with fresh checksums, so an unchanged row plans no action next time
    async fn write_synced_row(
        &self,
        sheet_row: usize,
        audience: &Audience,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let row = rows::format_audience_row(
            audience,
            rows::success_status(at),
            self.checksums().content_checksum(audience),
            self.checksums().shares_checksum(audience),
        )?;
        self.store
            .write_row(&self.config.audience_sheet, sheet_row, 0, row)
            .await
    }
}

fn failure(job: &Job, audience: &Audience) -> JobFailure {
    JobFailure {
        index: job.index,
        name: audience.name.clone(),
        message: job.error().to_string(),
    }
}

fn finish<T>(report: T, failures: Vec<JobFailure>) -> Result<T> {
    if failures.is_empty() {
        Ok(report)
    } else {
        warn!(failed = failures.len(), "Batch finished with failures");
        Err(AppError::BatchFailed { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::executor::JobExecutor;
    use crate::application::local_invoker::LocalInvoker;
    use crate::port::log_sink::mocks::MemoryLogSink;
    use crate::port::remarketing_api::mocks::InMemoryRemarketingApi;
    use crate::port::table_store::mocks::InMemoryTableStore;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::Row;
    use chrono::{TimeZone, Utc};
    use tokio_test::assert_ok;

    struct Fixture {
        store: Arc<InMemoryTableStore>,
        api: Arc<InMemoryRemarketingApi>,
        sink: Arc<MemoryLogSink>,
        controller: AudiencesController,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTableStore::new());
        let api = Arc::new(InMemoryRemarketingApi::new());
        let sink = Arc::new(MemoryLogSink::new());
        let clock = Arc::new(FixedTimeProvider(
            Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap(),
        ));
        let config = SyncConfig {
            max_concurrency: 2,
            retry_base_delay_ms: 1,
            ..SyncConfig::default()
        };
        let executor = Arc::new(JobExecutor::from_config(api.clone(), &config, clock.clone()));
        let controller = AudiencesController::new(
            config,
            store.clone(),
            api.clone(),
            Arc::new(LocalInvoker::new(executor)),
            sink.clone(),
            clock,
        );
        Fixture {
            store,
            api,
            sink,
            controller,
        }
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn header() -> Row {
        row(&["id", "name"])
    }

    #[tokio::test]
    async fn test_push_creates_new_rows_and_is_idempotent() {
        let fx = fixture();
        fx.store.set_rows(
            "Audiences",
            vec![
                header(),
                row(&["", "Buyers", "", "30", "", "acct-1"]),
                row(&["", "Browsers", "", "7"]),
            ],
        );
        fx.store.set_rows(
            "Rules",
            vec![header(), row(&["Buyers", "0", "", "U1", "EQUALS", "a,b", ""])],
        );

        let report = assert_ok!(fx.controller.push_audiences().await);
        assert_eq!(report.processed, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.shares_updated, 1);
        assert_eq!(fx.api.list_count(), 2);

        // Rule rows now reference the created id
        let buyers_id = fx.store.cell("Audiences", 1, rows::COL_ID);
        assert!(!buyers_id.is_empty());
        assert_eq!(fx.store.cell("Rules", 1, 0), buyers_id);
        assert!(fx.store.cell("Audiences", 1, COL_STATUS).starts_with("Success"));
        assert!(!fx.sink.lines().is_empty());

        let calls = fx.api.mutation_calls();
        let second = fx.controller.push_audiences().await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(fx.api.mutation_calls(), calls);
    }

    #[tokio::test]
    async fn test_failed_rows_are_reported_and_retried_next_run() {
        let fx = fixture();
        fx.api.reject_name("Bad");
        fx.store.set_rows(
            "Audiences",
            vec![
                header(),
                row(&["", "Good", "", "30"]),
                row(&["", "Bad", "", "30"]),
                row(&["", "Broken", "", "thirty"]),
            ],
        );

        let err = fx.controller.push_audiences().await.unwrap_err();
        let AppError::BatchFailed { failures } = err else {
            panic!("expected aggregated failures");
        };
        let failed_rows: Vec<usize> = failures.iter().map(|f| f.index).collect();
        assert_eq!(failed_rows, vec![2, 3]);
        assert!(fx.store.cell("Audiences", 1, COL_STATUS).starts_with("Success"));
        assert!(fx
            .store
            .cell("Audiences", 2, COL_STATUS)
            .starts_with("Error 2024-04-01T08:00:00Z: "));
        assert!(fx.store.cell("Audiences", 2, rows::COL_CONTENT_CHECKSUM).is_empty());

        // Only the failed row is retried once the rejection is gone
        fx.api.clear_rejections();
        fx.store
            .write_row("Audiences", 3, 0, row(&["", "Broken", "", "30"]))
            .await
            .unwrap();
        let report = fx.controller.push_audiences().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_deleting_every_rule_row_clears_remote_rules() {
        let fx = fixture();
        fx.store
            .set_rows("Audiences", vec![header(), row(&["", "Buyers", "", "30"])]);
        fx.store.set_rows(
            "Rules",
            vec![header(), row(&["Buyers", "0", "", "U1", "EQUALS", "a", ""])],
        );
        fx.controller.push_audiences().await.unwrap();
        let id = fx.store.cell("Audiences", 1, rows::COL_ID);
        let population = fx.api.list(&id).unwrap().list_population_rule.unwrap();
        assert_eq!(population.clauses.unwrap().len(), 1);

        fx.store.set_rows("Rules", vec![header()]);
        let report = fx.controller.push_audiences().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                processed: 1,
                updated: 1,
                ..SyncReport::default()
            }
        );
        let population = fx.api.list(&id).unwrap().list_population_rule.unwrap();
        assert!(population.clauses.unwrap_or_default().is_empty());

        let report = fx.controller.push_audiences().await.unwrap();
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_shares_failure_after_create_keeps_the_new_id() {
        let fx = fixture();
        fx.api.reject_shares("1000");
        fx.store.set_rows(
            "Audiences",
            vec![header(), row(&["", "Buyers", "", "30", "", "acct-1"])],
        );
        // A rule value equal to the audience name is not a reference
        fx.store.set_rows(
            "Rules",
            vec![header(), row(&["Buyers", "0", "", "U1", "EQUALS", "Buyers", ""])],
        );

        let err = fx.controller.push_audiences().await.unwrap_err();
        assert!(matches!(err, AppError::BatchFailed { .. }));
        assert_eq!(fx.store.cell("Audiences", 1, rows::COL_ID), "1000");
        let status = fx.store.cell("Audiences", 1, COL_STATUS);
        assert!(status.starts_with("Error 2024-04-01T08:00:00Z: "));
        assert!(status.ends_with("(created as 1000)"));
        assert!(!fx.store.cell("Audiences", 1, rows::COL_CONTENT_CHECKSUM).is_empty());
        assert!(fx.store.cell("Audiences", 1, rows::COL_SHARES_CHECKSUM).is_empty());
        assert_eq!(fx.store.cell("Rules", 1, 0), "1000");
        assert_eq!(fx.store.cell("Rules", 1, 5), "Buyers");

        // Only the shares are retried
        fx.api.clear_rejections();
        let report = fx.controller.push_audiences().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                processed: 1,
                shares_updated: 1,
                ..SyncReport::default()
            }
        );
        assert_eq!(fx.api.list_count(), 1);
        assert_eq!(
            fx.api.shares("1000").unwrap().shared_account_ids,
            vec!["acct-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_then_push_is_a_no_op() {
        let fx = fixture();
        let mut seeded = Audience::new("Remote");
        seeded.id = Some("900".to_string());
        seeded.life_span = 14;
        seeded.rules = vec![crate::domain::AudienceRule::new(0, "U3", "EQUALS", "x")];
        fx.api.insert(
            RuleCodec::default().to_remarketing_list(&seeded),
            vec!["acct-9".to_string()],
        );
        fx.store.set_rows("Audiences", vec![header(), row(&["stale", "Old"])]);

        let loaded = fx
            .controller
            .load_audiences(&[VariableName::new("u3", "Colour")])
            .await
            .unwrap();
        assert_eq!(loaded, LoadReport { audiences: 1, rules: 1 });
        assert_eq!(fx.store.cell("Audiences", 1, rows::COL_ID), "900");
        assert_eq!(fx.store.cell("Audiences", 1, rows::COL_SHARES), "acct-9");
        assert_eq!(fx.store.cell("Rules", 1, 2), "Colour");

        let calls = fx.api.mutation_calls();
        let report = fx.controller.push_audiences().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(fx.api.mutation_calls(), calls);
    }
}
