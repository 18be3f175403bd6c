//! Job manager configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::time::Duration;

/// Configuration for a job manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct JobConfig {
    /// Name used in logs and executor errors
    #[builder(default = "\"jobs\".to_string()", getter)]
    pub identifier: String,

    /// Maximum number of jobs running at once (values below 1 are treated as 1)
    #[builder(default = "1", getter)]
    pub concurrency: usize,

    /// Per-job timeout (None = unlimited)
    #[builder(default = "None", getter)]
    pub timeout: Option<Duration>,
}

impl JobConfig {
    /// Configuration with every field given explicitly
    pub fn with_limits(
        identifier: impl Into<String>,
        concurrency: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            concurrency,
            timeout,
        }
    }

    /// Concurrency bound actually applied by the manager
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            identifier: "jobs".to_string(),
            concurrency: 1,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JobConfig::default();
        assert_eq!(config.identifier, "jobs");
        assert_eq!(config.concurrency, 1);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = JobConfigBuilder::new()
            .identifier("migration-callbacks".to_string())
            .concurrency(8)
            .timeout(Some(Duration::from_secs(5)))
            .build()
            .expect("Failed to build config");

        assert_eq!(config.get_identifier(), "migration-callbacks");
        assert_eq!(*config.get_concurrency(), 8);
        assert_eq!(*config.get_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_concurrency_is_coerced() {
        let config = JobConfigBuilder::new()
            .concurrency(0)
            .build()
            .expect("Failed to build config");
        assert_eq!(config.effective_concurrency(), 1);
    }

    #[test]
    fn test_with_limits() {
        let config = JobConfig::with_limits("migration-actions", 4, None);
        assert_eq!(config.get_identifier(), "migration-actions");
        assert_eq!(*config.get_concurrency(), 4);
        assert!(config.get_timeout().is_none());
    }
}
