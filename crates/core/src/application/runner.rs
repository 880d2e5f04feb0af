//! Runner - bounded-concurrency dispatcher of job batches across the RPC boundary
//!
//! One batch at a time per runner. Jobs get sequential ids in input order and
//! are dispatched FIFO, at most `max_concurrency` in flight. Completions may
//! arrive in any order; each one is decoded, reconciled into the id-keyed map,
//! reported to the progress callback and followed by another drain pass. The
//! batch resolves once no job is PENDING or RUNNING, returning jobs in id order.
//!
//! The id map is owned by the batch future alone. Invocations run as spawned
//! tasks and only hand their serialized result back through their join handle.

use super::job_codec;
use crate::domain::{Job, JobId, JobStatus};
use crate::error::{AppError, Result};
use crate::port::{InvokeError, RemoteInvoker};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Runner state (not to be confused with job status)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
}

pub struct Runner {
    invoker: Arc<dyn RemoteInvoker>,
    max_concurrency: usize,
    state: Arc<Mutex<RunnerState>>,
}

impl Runner {
    /// `max_concurrency` is clamped to at least 1
    pub fn new(invoker: Arc<dyn RemoteInvoker>, max_concurrency: usize) -> Self {
        Self {
            invoker,
            max_concurrency: max_concurrency.max(1),
            state: Arc::new(Mutex::new(RunnerState::Idle)),
        }
    }

    pub fn state(&self) -> RunnerState {
        *lock(&self.state)
    }

    /// Run a batch and wait until every job is COMPLETE or ERROR
    pub async fn run(&self, operation: &str, jobs: Vec<Job>) -> Result<Vec<Job>> {
        self.run_with_progress(operation, jobs, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_complete` with each finished job
    /// before it is stored.
    ///
    /// Fails fast with `AppError::InvalidState` if a batch is already in flight;
    /// that batch is left untouched.
    pub async fn run_with_progress<F>(
        &self,
        operation: &str,
        jobs: Vec<Job>,
        on_complete: F,
    ) -> Result<Vec<Job>>
    where
        F: FnMut(&mut Job) + Send,
    {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let _busy = BusyGuard::acquire(&self.state)?;

        info!(
            operation = %operation,
            jobs = jobs.len(),
            max_concurrency = self.max_concurrency,
            "Starting job batch"
        );

        let mut batch = Batch::new(
            Arc::clone(&self.invoker),
            operation,
            self.max_concurrency,
            jobs,
            on_complete,
        );
        batch.run_jobs();

        while !batch.is_complete() {
            match batch.in_flight.next().await {
                Some(completion) => {
                    batch.handle(completion);
                    batch.run_jobs();
                }
                None => {
                    // Nothing in flight yet jobs still RUNNING: cannot make progress
                    error!(operation = %operation, "Batch stalled with no invocation in flight");
                    batch.fail_stranded();
                }
            }
        }

        let results = batch.into_results();
        let failed = results.iter().filter(|job| job.is_error()).count();
        info!(
            operation = %operation,
            completed = results.len() - failed,
            failed = failed,
            "Job batch finished"
        );
        Ok(results)
    }
}

fn lock(state: &Mutex<RunnerState>) -> MutexGuard<'_, RunnerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the runner in `Running` and resets it to `Idle` when dropped,
/// including when the batch future is dropped mid-flight
struct BusyGuard<'a> {
    state: &'a Mutex<RunnerState>,
}

impl<'a> BusyGuard<'a> {
    fn acquire(state: &'a Mutex<RunnerState>) -> Result<Self> {
        let mut current = lock(state);
        if *current == RunnerState::Running {
            warn!("Rejected batch: runner already has a batch in flight");
            return Err(AppError::InvalidState(
                "runner already has a batch in flight".to_string(),
            ));
        }
        *current = RunnerState::Running;
        Ok(Self { state })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = RunnerState::Idle;
    }
}

/// Result of one remote invocation, tagged with the dispatched job id
struct Completion {
    id: JobId,
    outcome: std::result::Result<std::result::Result<String, InvokeError>, JoinError>,
}

struct Batch<F> {
    invoker: Arc<dyn RemoteInvoker>,
    operation: Arc<str>,
    max_concurrency: usize,
    jobs: BTreeMap<JobId, Job>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    on_complete: F,
}

impl<F> Batch<F>
where
    F: FnMut(&mut Job) + Send,
{
    fn new(
        invoker: Arc<dyn RemoteInvoker>,
        operation: &str,
        max_concurrency: usize,
        jobs: Vec<Job>,
        on_complete: F,
    ) -> Self {
        let jobs = jobs
            .into_iter()
            .enumerate()
            .map(|(id, mut job)| {
                job.id = id;
                (id, job)
            })
            .collect();

        Self {
            invoker,
            operation: Arc::from(operation),
            max_concurrency,
            jobs,
            in_flight: FuturesUnordered::new(),
            on_complete,
        }
    }

    /// Drain loop: dispatch PENDING jobs in id order while slots are free
    fn run_jobs(&mut self) {
        let pending: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.status() == JobStatus::Pending)
            .map(|job| job.id)
            .collect();
        let mut running = self.count(JobStatus::Running);

        for id in pending {
            if running >= self.max_concurrency {
                break;
            }
            if self.dispatch(id) {
                running += 1;
            }
        }
    }

    /// Mark the job RUNNING and start its invocation; false if it never left
    fn dispatch(&mut self, id: JobId) -> bool {
        let Some(job) = self.jobs.get_mut(&id) else {
            return false;
        };
        if let Err(e) = job.start() {
            warn!(job_id = id, error = %e, "Skipping job that cannot start");
            return false;
        }

        let payload = match job_codec::encode(job) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = id, error = %e, "Job could not be serialized");
                job.settle(Some(format!("could not serialize job: {}", e)));
                let mut finished = job.clone();
                (self.on_complete)(&mut finished);
                self.jobs.insert(id, finished);
                return false;
            }
        };

        debug!(
            job_id = id,
            index = job.index,
            variant = %job.variant(),
            operation = %self.operation,
            "Dispatching job"
        );

        let invoker = Arc::clone(&self.invoker);
        let operation = Arc::clone(&self.operation);
        let handle = tokio::spawn(async move { invoker.invoke(&operation, payload).await });
        self.in_flight
            .push(async move {
                Completion {
                    id,
                    outcome: handle.await,
                }
            }
            .boxed());
        true
    }

    /// Reconcile one finished invocation into the job map
    fn handle(&mut self, completion: Completion) {
        let Completion { id, outcome } = completion;

        let mut finished = match outcome {
            Ok(Ok(serialized)) => match job_codec::decode(&serialized) {
                Ok(mut job) => {
                    job.settle(None);
                    job
                }
                Err(e) => self.placeholder_failure(id, format!("undecodable result: {}", e)),
            },
            // The failure message carries the partially updated job when available
            Ok(Err(invoke_err)) => match job_codec::decode(&invoke_err.message) {
                Ok(mut job) => {
                    job.settle(Some("remote invocation failed".to_string()));
                    job
                }
                Err(_) => self.placeholder_failure(id, invoke_err.message),
            },
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    "remote invocation panicked"
                } else {
                    "remote invocation was cancelled"
                };
                error!(job_id = id, error = ?join_err, "{}", reason);
                self.placeholder_failure(id, reason.to_string())
            }
        };
        finished.id = id;

        if finished.is_error() {
            warn!(
                job_id = id,
                index = finished.index,
                error = %finished.error(),
                "Job failed"
            );
        } else {
            debug!(job_id = id, index = finished.index, "Job completed");
        }

        (self.on_complete)(&mut finished);
        self.jobs.insert(id, finished);
    }

    /// The dispatched job itself, marked as failed with `reason`
    fn placeholder_failure(&self, id: JobId, reason: String) -> Job {
        let mut job = self
            .jobs
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Job::generic(id, Vec::new()));
        job.settle(Some(reason));
        job
    }

    fn fail_stranded(&mut self) {
        let stranded: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| !job.status().is_terminal())
            .map(|job| job.id)
            .collect();
        for id in stranded {
            let mut job = self.placeholder_failure(id, "job was never completed".to_string());
            (self.on_complete)(&mut job);
            self.jobs.insert(id, job);
        }
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|job| job.status() == status).count()
    }

    fn is_complete(&self) -> bool {
        !self.jobs.is_empty()
            && self
                .jobs
                .values()
                .all(|job| job.status().is_terminal())
    }

    fn into_results(self) -> Vec<Job> {
        self.jobs.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Audience};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echo worker: waits a per-index delay, then returns the job (or fails it)
    struct MockInvoker {
        delays_ms: Vec<u64>,
        fail_index: Option<usize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<usize>>,
    }

    impl MockInvoker {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms,
                fail_index: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, index: usize) -> Self {
            self.fail_index = Some(index);
            self
        }

        fn dispatch_order(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteInvoker for MockInvoker {
        async fn invoke(
            &self,
            _operation: &str,
            serialized_job: String,
        ) -> std::result::Result<String, InvokeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let mut job = job_codec::decode(&serialized_job).unwrap();
            assert_eq!(job.status(), JobStatus::Running);
            self.calls.lock().unwrap().push(job.index);

            let delay = self.delays_ms.get(job.index).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_index == Some(job.index) {
                job.fail("rejected by remote").unwrap();
                return Err(InvokeError::new(job_codec::encode(&job).unwrap()));
            }
            // Status left RUNNING on purpose: the runner must settle it
            Ok(job_codec::encode(&job).unwrap())
        }
    }

    fn jobs(count: usize) -> Vec<Job> {
        (0..count)
            .map(|i| {
                Job::audience_process(
                    i,
                    Audience::new(format!("A{}", i)),
                    BTreeSet::from([Action::Create]),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_resolves_immediately() {
        let runner = Runner::new(Arc::new(MockInvoker::new(vec![])), 2);
        let results = runner.run("op", Vec::new()).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let invoker = Arc::new(MockInvoker::new(vec![40, 10, 30, 5, 20]));
        let runner = Runner::new(invoker.clone(), 2);

        let results = runner.run("op", jobs(5)).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(invoker.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert!(results.iter().all(Job::is_complete));
    }

    #[tokio::test]
    async fn test_results_are_in_input_order_despite_completion_order() {
        let invoker = Arc::new(MockInvoker::new(vec![50, 1, 1, 1]));
        let runner = Runner::new(invoker.clone(), 4);

        let results = runner.run("op", jobs(4)).await.unwrap();

        let ids: Vec<usize> = results.iter().map(|j| j.id).collect();
        let indexes: Vec<usize> = results.iter().map(|j| j.index).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        assert_eq!(invoker.dispatch_order(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dispatch_is_fifo_with_one_slot() {
        let invoker = Arc::new(MockInvoker::new(vec![5, 1, 3]));
        let runner = Runner::new(invoker.clone(), 1);

        runner.run("op", jobs(3)).await.unwrap();
        assert_eq!(invoker.dispatch_order(), vec![0, 1, 2]);
        assert_eq!(invoker.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_batch() {
        let invoker = Arc::new(MockInvoker::new(vec![1, 1, 1, 1]).failing(1));
        let runner = Runner::new(invoker, 2);

        let results = runner.run("op", jobs(4)).await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[1].is_error());
        assert_eq!(results[1].error(), "rejected by remote");
        assert_eq!(results[1].audience().unwrap().name, "A1");
        assert_eq!(results.iter().filter(|j| j.is_complete()).count(), 3);
    }

    #[tokio::test]
    async fn test_non_json_failure_keeps_placeholder_job() {
        struct Refusing;

        #[async_trait]
        impl RemoteInvoker for Refusing {
            async fn invoke(
                &self,
                _operation: &str,
                _serialized_job: String,
            ) -> std::result::Result<String, InvokeError> {
                Err(InvokeError::new("connection refused"))
            }
        }

        let runner = Runner::new(Arc::new(Refusing), 3);
        let results = runner.run("op", jobs(2)).await.unwrap();
        assert!(results.iter().all(Job::is_error));
        assert_eq!(results[0].error(), "connection refused");
        assert_eq!(results[0].audience().unwrap().name, "A0");
    }

    #[tokio::test]
    async fn test_panicking_invocation_is_recorded_as_error() {
        struct Panicking;

        #[async_trait]
        impl RemoteInvoker for Panicking {
            async fn invoke(
                &self,
                _operation: &str,
                _serialized_job: String,
            ) -> std::result::Result<String, InvokeError> {
                panic!("worker blew up");
            }
        }

        let runner = Runner::new(Arc::new(Panicking), 1);
        let results = runner.run("op", jobs(2)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Job::is_error));
        assert_eq!(results[1].error(), "remote invocation panicked");
    }

    #[tokio::test]
    async fn test_already_failed_jobs_are_not_dispatched() {
        let invoker = Arc::new(MockInvoker::new(vec![1, 1]));
        let runner = Runner::new(invoker.clone(), 2);
        let mut batch = jobs(2);
        batch[0].fail("bad row").unwrap();

        let results = runner.run("op", batch).await.unwrap();
        assert_eq!(invoker.dispatch_order(), vec![1]);
        assert!(results[0].is_error());
        assert!(results[1].is_complete());
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_job() {
        let runner = Runner::new(Arc::new(MockInvoker::new(vec![3, 1, 2])), 2);
        let mut seen = Vec::new();

        runner
            .run_with_progress("op", jobs(3), |job| seen.push(job.id))
            .await
            .unwrap();

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_second_batch_is_rejected_while_running() {
        let invoker = Arc::new(MockInvoker::new(vec![50, 50]));
        let runner = Arc::new(Runner::new(invoker, 2));

        let first = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run("op", jobs(2)).await })
        };
        while runner.state() != RunnerState::Running {
            tokio::task::yield_now().await;
        }

        let err = runner.run("op", jobs(1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let results = first.await.unwrap().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Job::is_complete));
        assert_eq!(runner.state(), RunnerState::Idle);

        // Usable again once idle
        assert_eq!(runner.run("op", jobs(1)).await.unwrap().len(), 1);
    }
}
