//! Batch execution with bounded concurrency

use crate::{ErrorHandler, Job, JobConfig, JobError};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Outcome counters for one call to [`JobManager::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Jobs that were started
    pub dispatched: usize,
    /// Started jobs that returned an error, timed out or panicked
    pub failed: usize,
    /// Queued jobs never started because the batch was cancelled
    pub cancelled: usize,
}

impl BatchReport {
    /// Whether every queued job was started and succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Runs one job definition over a queue of arguments
pub struct JobManager<J: Job> {
    job: Arc<J>,
    handler: Arc<dyn ErrorHandler<J::Error>>,
    config: JobConfig,
    queued: Vec<J::Args>,
}

impl<J: Job> JobManager<J> {
    pub fn new(job: J, handler: Arc<dyn ErrorHandler<J::Error>>, config: JobConfig) -> Self {
        Self {
            job: Arc::new(job),
            handler,
            config,
            queued: Vec::new(),
        }
    }

    /// Queue one execution of the job
    pub fn add_job(&mut self, args: J::Args) {
        self.queued.push(args);
    }

    /// Number of queued executions
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Execute every queued job and wait until all started jobs have finished
    ///
    /// Jobs start in queue order. Once `cancel` fires no further job is
    /// started; each job left in the queue is reported as
    /// [`JobError::Cancelled`], while jobs already running are awaited.
    pub async fn run(&mut self, cancel: &CancellationToken) -> BatchReport {
        let queued = std::mem::take(&mut self.queued);
        let identifier = self.config.get_identifier().clone();
        let concurrency = self.config.effective_concurrency();
        let job_timeout = *self.config.get_timeout();
        let mut report = BatchReport::default();

        debug!(
            identifier = %identifier,
            jobs = queued.len(),
            concurrency,
            "Starting job batch"
        );

        let limiter = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        let mut queued = queued.into_iter();

        while let Some(args) = queued.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = limiter.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                report.cancelled += 1 + queued.len();
                warn!(
                    identifier = %identifier,
                    cancelled = report.cancelled,
                    "Job batch cancelled before all jobs started"
                );
                for _ in 0..report.cancelled {
                    self.handler.handle_error(
                        JobError::Cancelled {
                            identifier: identifier.clone(),
                        }
                        .into(),
                    );
                }
                break;
            };

            let job = Arc::clone(&self.job);
            let task_identifier = identifier.clone();
            tasks.spawn(async move {
                let _permit = permit; // Hold permit until the job is done

                match job_timeout {
                    Some(after) => match timeout(after, job.run(args)).await {
                        Ok(result) => result,
                        Err(_) => Err(JobError::Timeout {
                            identifier: task_identifier,
                            after,
                        }
                        .into()),
                    },
                    None => job.run(args).await,
                }
            });
            report.dispatched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    self.handler.handle_error(e);
                }
                Err(join_error) => {
                    report.failed += 1;
                    let message = join_error_message(join_error);
                    error!(identifier = %identifier, message = %message, "Job panicked");
                    self.handler.handle_error(
                        JobError::Panicked {
                            identifier: identifier.clone(),
                            message,
                        }
                        .into(),
                    );
                }
            }
        }

        debug!(
            identifier = %identifier,
            dispatched = report.dispatched,
            failed = report.failed,
            cancelled = report.cancelled,
            "Job batch finished"
        );
        report
    }
}

fn join_error_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    panic_message(join_error.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
