//! Thread-safe error sink for concurrent workers

use crate::DriftError;
use drift_jobs::ErrorHandler;
use parking_lot::Mutex;

/// Accumulates errors reported by concurrently running jobs
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<DriftError>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: DriftError) {
        self.errors.lock().push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Remove and return every collected error, leaving the collector empty
    pub fn drain(&self) -> Vec<DriftError> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl ErrorHandler<DriftError> for ErrorCollector {
    fn handle_error(&self, error: DriftError) {
        self.push(error);
    }
}
