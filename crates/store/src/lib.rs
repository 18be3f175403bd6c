//! # drift-store
//!
//! Key-value table store abstraction used by the drift migration engine.
//!
//! ## Features
//!
//! - **Multi-backend support**: In-memory and DynamoDB backends
//! - **Paginated primitives**: Table listing and scanning with store-native cursors
//! - **Structural marshaling**: Convert serde types to and from raw items
//! - **Update expressions**: `SET`/`REMOVE` expressions with value placeholders
//!
//! ## Quick Start
//!
//! ```rust
//! use drift_store::{
//!     AttributeValue, CreateTableRequest, MemoryStore, MemoryStoreConfig, ScalarAttributeType,
//!     ScanRequest, TableStore,
//! };
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new(MemoryStoreConfig::default());
//! store
//!     .create_table(CreateTableRequest::hash_key("users", "Id", ScalarAttributeType::N))
//!     .await
//!     .unwrap();
//!
//! let mut item = drift_store::Item::new();
//! item.insert("Id".to_string(), AttributeValue::n(1));
//! item.insert("Name".to_string(), AttributeValue::s("ada"));
//! store.put_item("users", item).await.unwrap();
//!
//! let page = store.scan(ScanRequest::new("users")).await.unwrap();
//! assert_eq!(page.items.len(), 1);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod attribute;
pub mod backends;
pub mod config;
pub mod expression;
pub mod marshal;

pub use attribute::*;
pub use backends::*;
pub use config::*;
pub use marshal::{from_item, to_attribute_value, to_item, MarshalError, MarshalResult};

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid update expression: {0}")]
    InvalidExpression(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Store configuration error: {0}")]
    Configuration(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Role of an attribute in a table's primary key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

/// One element of a table's key schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub attribute_type: ScalarAttributeType,
    pub key_type: KeyType,
}

/// Provisioned read/write capacity for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionedThroughput {
    pub read_capacity_units: u64,
    pub write_capacity_units: u64,
}

/// Request to create a table
#[derive(Debug, Clone)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    /// `None` selects on-demand billing where the backend supports it
    pub provisioned_throughput: Option<ProvisionedThroughput>,
}

impl CreateTableRequest {
    /// Create a request for a table keyed by a single hash attribute
    pub fn hash_key(
        table_name: impl Into<String>,
        attribute_name: impl Into<String>,
        attribute_type: ScalarAttributeType,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            key_schema: vec![KeySchemaElement {
                attribute_name: attribute_name.into(),
                attribute_type,
                key_type: KeyType::Hash,
            }],
            provisioned_throughput: None,
        }
    }

    /// Add a range (sort) key attribute
    pub fn with_range_key(
        mut self,
        attribute_name: impl Into<String>,
        attribute_type: ScalarAttributeType,
    ) -> Self {
        self.key_schema.push(KeySchemaElement {
            attribute_name: attribute_name.into(),
            attribute_type,
            key_type: KeyType::Range,
        });
        self
    }

    /// Set provisioned capacity
    pub fn with_throughput(mut self, read_capacity_units: u64, write_capacity_units: u64) -> Self {
        self.provisioned_throughput = Some(ProvisionedThroughput {
            read_capacity_units,
            write_capacity_units,
        });
        self
    }
}

/// Request for one page of table names
#[derive(Debug, Clone, Default)]
pub struct ListTablesRequest {
    pub exclusive_start_table_name: Option<String>,
    pub limit: Option<u32>,
}

/// One page of table names
#[derive(Debug, Clone, Default)]
pub struct ListTablesPage {
    pub table_names: Vec<String>,
    /// Cursor for the next page, `None` when every table has been listed
    pub last_evaluated_table_name: Option<String>,
}

/// Request for one page of a table scan
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub table_name: String,
    pub consistent_read: bool,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

impl ScanRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            consistent_read: false,
            limit: None,
            exclusive_start_key: None,
        }
    }

    pub fn consistent(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, key: Option<Item>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// One page of scanned items
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Cursor for the next page, `None` when the scan is complete
    pub last_evaluated_key: Option<Item>,
}

/// Request to update a single item through an update expression
#[derive(Debug, Clone)]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: Item,
    pub update_expression: String,
    /// Values referenced as `:placeholder` in the expression
    pub expression_attribute_values: Item,
    /// Aliases referenced as `#alias` in the expression
    pub expression_attribute_names: Option<HashMap<String, String>>,
}

/// Core store trait that all table store backends must implement
///
/// Implementations must be safe for concurrent use without external locking.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create a table
    async fn create_table(&self, request: CreateTableRequest) -> StoreResult<()>;

    /// List one page of table names
    async fn list_tables(&self, request: ListTablesRequest) -> StoreResult<ListTablesPage>;

    /// Scan one page of a table
    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanPage>;

    /// Get an item by its primary key
    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>>;

    /// Write an item unconditionally, replacing any item with the same key
    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()>;

    /// Delete an item by its primary key
    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()>;

    /// Apply an update expression to an item, creating it if absent
    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<()>;

    /// Check whether a table exists by walking every page of the table listing
    ///
    /// `page_size` is passed to each `list_tables` call as its limit.
    async fn table_exists(&self, table_name: &str, page_size: Option<u32>) -> StoreResult<bool> {
        let mut request = ListTablesRequest {
            exclusive_start_table_name: None,
            limit: page_size,
        };
        loop {
            let page = self.list_tables(request.clone()).await?;
            if page.table_names.iter().any(|name| name == table_name) {
                return Ok(true);
            }
            match page.last_evaluated_table_name {
                Some(last) => request.exclusive_start_table_name = Some(last),
                None => return Ok(false),
            }
        }
    }
}
