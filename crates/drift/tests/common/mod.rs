//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use drift::{ActionRecorder, AttributeValue, CallbackError, Drifter, DrifterConfigBuilder, Item};
use drift_store::{
    CreateTableRequest, ListTablesPage, ListTablesRequest, MemoryStore, MemoryStoreConfig,
    ScalarAttributeType, ScanPage, ScanRequest, StoreResult, TableStore, UpdateItemRequest,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store call recorded by [`CountingStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Put { table: String, item: Item },
    Delete { table: String, key: Item },
    Update { table: String, key: Item },
}

/// Memory store wrapper counting scans and recording mutations in call order
pub struct CountingStore {
    inner: MemoryStore,
    scans: AtomicUsize,
    list_tables: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl CountingStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            inner: MemoryStore::new(config),
            scans: AtomicUsize::new(0),
            list_tables: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn list_tables_calls(&self) -> usize {
        self.list_tables.load(Ordering::SeqCst)
    }

    /// Recorded mutations, in the order they reached the store
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Recorded mutations excluding writes to `table`
    pub fn calls_outside(&self, table: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                Call::Put { table: t, .. }
                | Call::Delete { table: t, .. }
                | Call::Update { table: t, .. } => t != table,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.scans.store(0, Ordering::SeqCst);
        self.list_tables.store(0, Ordering::SeqCst);
        self.calls.lock().clear();
    }
}

#[async_trait]
impl TableStore for CountingStore {
    async fn create_table(&self, request: CreateTableRequest) -> StoreResult<()> {
        self.inner.create_table(request).await
    }

    async fn list_tables(&self, request: ListTablesRequest) -> StoreResult<ListTablesPage> {
        self.list_tables.fetch_add(1, Ordering::SeqCst);
        self.inner.list_tables(request).await
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanPage> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(request).await
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        self.inner.get_item(table_name, key).await
    }

    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        self.calls.lock().push(Call::Put {
            table: table_name.to_string(),
            item: item.clone(),
        });
        self.inner.put_item(table_name, item).await
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        self.calls.lock().push(Call::Delete {
            table: table_name.to_string(),
            key: key.clone(),
        });
        self.inner.delete_item(table_name, key).await
    }

    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<()> {
        self.calls.lock().push(Call::Update {
            table: request.table_name.clone(),
            key: request.key.clone(),
        });
        self.inner.update_item(request).await
    }
}

pub const USERS: &str = "Users";
pub const AUDIT: &str = "Audit";

pub fn id_key(id: u64) -> Item {
    let mut key = Item::new();
    key.insert("Id".to_string(), AttributeValue::n(id));
    key
}

pub fn id_of(item: &Item) -> u64 {
    item.get("Id")
        .and_then(AttributeValue::as_n)
        .and_then(|n| n.parse().ok())
        .expect("item has a numeric Id")
}

/// Store with `Users` holding ids `1..=users` and an empty `Audit` table
pub async fn seeded_store(config: MemoryStoreConfig, users: u64) -> Arc<CountingStore> {
    let store = Arc::new(CountingStore::new(config));
    for table in [USERS, AUDIT] {
        store
            .create_table(CreateTableRequest::hash_key(table, "Id", ScalarAttributeType::N))
            .await
            .unwrap();
    }
    for id in 1..=users {
        let mut item = id_key(id);
        item.insert("Name".to_string(), AttributeValue::s(format!("user-{}", id)));
        store.inner().put_item(USERS, item).await.unwrap();
    }
    store
}

/// Engine over `store` with an initialized metadata table
pub async fn drifter(store: Arc<CountingStore>) -> Drifter {
    let config = DrifterConfigBuilder::testing()
        .build()
        .expect("Failed to build config");
    let drifter = Drifter::new(config).with_store(store);
    drifter.init(5, 5).await.unwrap();
    drifter
}

/// Callback copying each item's key into the audit table
pub fn audit_copy(item: &Item, recorder: &ActionRecorder) -> Result<(), CallbackError> {
    recorder.insert_item(id_key(id_of(item)), Some(AUDIT));
    Ok(())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
