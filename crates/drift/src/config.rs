//! Engine configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;
use std::time::Duration;

/// How the scan page size is derived from a run's concurrency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSizePolicy {
    /// One page holds exactly as many items as may run at once
    #[default]
    MatchConcurrency,
    /// Constant page size regardless of concurrency
    Fixed(u32),
    /// Page size is a multiple of the concurrency
    Multiple(u32),
}

impl PageSizePolicy {
    /// Page size for a run with the given (already coerced) concurrency
    pub fn page_size(&self, concurrency: usize) -> u32 {
        let concurrency = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
        match self {
            PageSizePolicy::MatchConcurrency => concurrency,
            PageSizePolicy::Fixed(size) => (*size).max(1),
            PageSizePolicy::Multiple(factor) => concurrency.saturating_mul((*factor).max(1)),
        }
    }
}

/// Configuration for a [`Drifter`](crate::Drifter)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct DrifterConfig {
    /// Table recording applied migrations
    #[builder(default = "\"drift_migrations\".to_string()", getter)]
    pub meta_table_name: String,

    /// Mapping from concurrency to scan page size
    #[builder(default = "PageSizePolicy::MatchConcurrency", getter)]
    pub page_size: PageSizePolicy,

    /// Timeout applied to each callback and action job (None = unlimited)
    ///
    /// An action that times out has its store call dropped mid-flight, so the
    /// write may or may not have reached the table.
    #[builder(default = "None", getter)]
    pub job_timeout: Option<Duration>,

    /// Table names requested per listing page when looking up tables
    #[builder(default = "100", getter)]
    pub list_tables_page_size: u32,
}

impl Default for DrifterConfig {
    fn default() -> Self {
        Self {
            meta_table_name: "drift_migrations".to_string(),
            page_size: PageSizePolicy::MatchConcurrency,
            job_timeout: None,
            list_tables_page_size: 100,
        }
    }
}

impl DrifterConfigBuilder {
    /// Create a development configuration with a short job timeout
    pub fn development() -> Self {
        DrifterConfigBuilder::new()
            .meta_table_name("drift_migrations_dev".to_string())
            .job_timeout(Some(Duration::from_secs(60)))
    }

    /// Create a production configuration where store calls always run to completion
    pub fn production() -> Self {
        DrifterConfigBuilder::new()
            .page_size(PageSizePolicy::MatchConcurrency)
            .job_timeout(None)
            .list_tables_page_size(100)
    }

    /// Create a testing configuration with tiny listing pages
    pub fn testing() -> Self {
        DrifterConfigBuilder::new()
            .job_timeout(Some(Duration::from_secs(10)))
            .list_tables_page_size(2)
    }
}
