//! # drift-jobs
//!
//! Bounded concurrent job execution for the drift migration engine.
//!
//! A [`JobManager`] holds one job definition and a queue of argument values.
//! Each call to [`JobManager::run`] executes every queued argument with at
//! most `concurrency` jobs in flight, waits for all of them, and reports each
//! failure to a pluggable [`ErrorHandler`]. The manager is empty afterwards and
//! can be driven again for the next batch.
//!
//! ```rust
//! use async_trait::async_trait;
//! use drift_jobs::{ErrorHandler, Job, JobConfig, JobError, JobManager};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Double;
//!
//! #[async_trait]
//! impl Job for Double {
//!     type Args = u32;
//!     type Error = JobError;
//!
//!     async fn run(&self, _args: u32) -> Result<(), JobError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Ignore;
//!
//! impl ErrorHandler<JobError> for Ignore {
//!     fn handle_error(&self, _error: JobError) {}
//! }
//!
//! # tokio_test::block_on(async {
//! let mut manager = JobManager::new(Double, Arc::new(Ignore), JobConfig::default());
//! manager.add_job(1);
//! manager.add_job(2);
//!
//! let report = manager.run(&CancellationToken::new()).await;
//! assert_eq!(report.dispatched, 2);
//! assert_eq!(report.failed, 0);
//! # });
//! ```

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod manager;

pub use config::*;
pub use manager::{BatchReport, JobManager};

/// Failures produced by the executor itself rather than by job code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job in batch '{identifier}' was cancelled before it started")]
    Cancelled { identifier: String },

    #[error("Job in batch '{identifier}' timed out after {after:?}")]
    Timeout { identifier: String, after: Duration },

    #[error("Job in batch '{identifier}' panicked: {message}")]
    Panicked { identifier: String, message: String },
}

/// Result type for job execution
pub type JobResult<T> = Result<T, JobError>;

/// A unit of work executed once per queued argument
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Argument passed to each execution
    type Args: Send + 'static;

    /// Error reported to the batch's error handler
    type Error: From<JobError> + Send + 'static;

    async fn run(&self, args: Self::Args) -> Result<(), Self::Error>;
}

/// Sink receiving every error produced while running a batch
pub trait ErrorHandler<E>: Send + Sync {
    fn handle_error(&self, error: E);
}
