//! Error taxonomy for migration runs

use drift_jobs::JobError;
use drift_store::{MarshalError, StoreError};
use std::fmt;
use thiserror::Error;

/// Error returned by user migration callbacks
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the migration engine
#[derive(Error, Debug)]
pub enum DriftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Failed to decode migration record: {0}")]
    Decode(#[source] MarshalError),

    #[error("Marshal error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("{0}")]
    Callback(#[source] CallbackError),

    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Job execution error: {0}")]
    Job(#[from] JobError),
}

/// Result type for engine operations
pub type DriftResult<T> = Result<T, DriftError>;

/// Discriminant of a [`DriftError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    NotFound,
    Decode,
    Marshal,
    Store,
    Callback,
    InvalidMigration,
    InvalidAction,
    Job,
}

impl DriftError {
    /// Wrap a store failure with the operation that caused it
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        DriftError::Store {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DriftError::Config(_) => ErrorKind::Config,
            DriftError::NotFound(_) => ErrorKind::NotFound,
            DriftError::Decode(_) => ErrorKind::Decode,
            DriftError::Marshal(_) => ErrorKind::Marshal,
            DriftError::Store { .. } => ErrorKind::Store,
            DriftError::Callback(_) => ErrorKind::Callback,
            DriftError::InvalidMigration(_) => ErrorKind::InvalidMigration,
            DriftError::InvalidAction(_) => ErrorKind::InvalidAction,
            DriftError::Job(_) => ErrorKind::Job,
        }
    }
}

/// States of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Preflight,
    CallbackPhase,
    ActionPhase,
    Commit,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Preflight => "Preflight",
            Phase::CallbackPhase => "CallbackPhase",
            Phase::ActionPhase => "ActionPhase",
            Phase::Commit => "Commit",
            Phase::Done => "Done",
            Phase::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Every error reported by the phase that stopped a run
#[derive(Error, Debug)]
#[error("migration aborted during {phase} with {} error(s)", .errors.len())]
pub struct RunFailure {
    pub phase: Phase,
    pub errors: Vec<DriftError>,
}

impl RunFailure {
    pub fn new(phase: Phase, errors: Vec<DriftError>) -> Self {
        Self { phase, errors }
    }

    /// Kinds of the collected errors, in report order
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(DriftError::kind).collect()
    }

    /// Whether any collected error has the given kind
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_errors_display_verbatim() {
        let error = DriftError::Callback("user record 7 is corrupt".into());
        assert_eq!(error.to_string(), "user record 7 is corrupt");
        assert_eq!(error.kind(), ErrorKind::Callback);
    }

    #[test]
    fn test_store_errors_carry_context() {
        let error = DriftError::store(
            "scan of table users failed",
            StoreError::TableNotFound("users".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "scan of table users failed: Table not found: users"
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_run_failure_summary() {
        let failure = RunFailure::new(
            Phase::CallbackPhase,
            vec![
                DriftError::Callback("a".into()),
                DriftError::NotFound("b".to_string()),
            ],
        );
        assert_eq!(
            failure.to_string(),
            "migration aborted during CallbackPhase with 2 error(s)"
        );
        assert_eq!(failure.kinds(), vec![ErrorKind::Callback, ErrorKind::NotFound]);
        assert!(failure.contains(ErrorKind::NotFound));
        assert!(!failure.contains(ErrorKind::Store));
    }
}
