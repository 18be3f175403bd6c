//! Store backend configuration types and builders

use serde::{Deserialize, Serialize};
use service_builder::builder;

/// Configuration for the in-memory backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct MemoryStoreConfig {
    /// Maximum number of items returned by a single scan page
    #[builder(default = "1000", getter)]
    pub max_page_size: usize,

    /// Maximum number of table names returned by a single listing page
    #[builder(default = "100", getter)]
    pub list_tables_page_size: usize,

    /// Maximum number of tables (0 = unlimited)
    #[builder(default = "0", getter)]
    pub max_tables: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1000,
            list_tables_page_size: 100,
            max_tables: 0,
        }
    }
}

/// Configuration for the DynamoDB backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct DynamoStoreConfig {
    /// AWS region
    #[builder(default = "\"us-east-1\".to_string()", getter)]
    pub region: String,

    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local
    #[builder(default = "None", getter)]
    pub endpoint_url: Option<String>,
}

impl Default for DynamoStoreConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
        }
    }
}

impl MemoryStoreConfigBuilder {
    /// Create a testing configuration with tiny pages so pagination is exercised
    pub fn testing() -> Self {
        MemoryStoreConfigBuilder::new()
            .max_page_size(2)
            .list_tables_page_size(2)
    }
}

impl DynamoStoreConfigBuilder {
    /// Create a configuration pointing at DynamoDB Local
    pub fn local() -> Self {
        DynamoStoreConfigBuilder::new()
            .region("us-east-1".to_string())
            .endpoint_url(Some("http://localhost:8000".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memory_config() {
        let config = MemoryStoreConfig::default();
        assert_eq!(config.max_page_size, 1000);
        assert_eq!(config.list_tables_page_size, 100);
        assert_eq!(config.max_tables, 0);
    }

    #[test]
    fn test_memory_config_builder() {
        let config = MemoryStoreConfigBuilder::new()
            .max_page_size(25)
            .build()
            .expect("Failed to build config");

        assert_eq!(*config.get_max_page_size(), 25);
        assert_eq!(*config.get_list_tables_page_size(), 100); // Default
    }

    #[test]
    fn test_testing_config() {
        let config = MemoryStoreConfigBuilder::testing()
            .build()
            .expect("Failed to build config");
        assert_eq!(*config.get_max_page_size(), 2);
        assert_eq!(*config.get_list_tables_page_size(), 2);
    }

    #[test]
    fn test_local_dynamo_config() {
        let config = DynamoStoreConfigBuilder::local()
            .build()
            .expect("Failed to build config");
        assert_eq!(config.get_region(), "us-east-1");
        assert_eq!(
            config.get_endpoint_url().as_deref(),
            Some("http://localhost:8000")
        );
    }
}
