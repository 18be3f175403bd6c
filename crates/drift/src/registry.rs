//! Bookkeeping of applied migrations in the metadata table

use crate::{DriftError, DriftResult, Drifter, MigrationRecord, TableScanner};
use drift_store::{
    from_item, to_item, AttributeValue, CreateTableRequest, Item, ScalarAttributeType, StoreError,
    TableStore,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Hash key attribute of the metadata table
pub const NUMBER_ATTRIBUTE: &str = "Number";

fn number_key(number: u64) -> Item {
    let mut key = Item::new();
    key.insert(NUMBER_ATTRIBUTE.to_string(), AttributeValue::n(number));
    key
}

impl Drifter {
    /// Create the metadata table unless it already exists
    pub async fn init(&self, write_capacity: u64, read_capacity: u64) -> DriftResult<()> {
        let store = self.store()?;
        let table_name = self.config().get_meta_table_name().clone();

        if self.find_table(&table_name).await? {
            debug!(table_name = %table_name, "Metadata table already exists");
            return Ok(());
        }

        let request =
            CreateTableRequest::hash_key(table_name.as_str(), NUMBER_ATTRIBUTE, ScalarAttributeType::N)
                .with_throughput(read_capacity, write_capacity);

        match store.create_table(request).await {
            Ok(()) => {
                info!(
                    table_name = %table_name,
                    read_capacity,
                    write_capacity,
                    "Created metadata table"
                );
                Ok(())
            }
            Err(StoreError::TableExists(_)) => {
                debug!(table_name = %table_name, "Metadata table created concurrently");
                Ok(())
            }
            Err(e) => Err(DriftError::store(
                format!("failed to create metadata table {}", table_name),
                e,
            )),
        }
    }

    /// Every applied migration, ascending by number
    ///
    /// The whole metadata table is read; a single undecodable record fails
    /// the call without returning partial results.
    pub async fn applied(&self) -> DriftResult<Vec<MigrationRecord>> {
        let store = self.store()?;
        let mut scanner =
            TableScanner::new(Arc::clone(store), self.config().get_meta_table_name().clone(), None)
                .consistent(true);

        let mut records = Vec::new();
        while let Some(page) = scanner.next_page().await? {
            for item in &page {
                let record: MigrationRecord = from_item(item).map_err(DriftError::Decode)?;
                records.push(record);
            }
        }

        records.sort_by_key(|record| record.number);
        debug!(count = records.len(), pages = scanner.pages(), "Loaded applied migrations");
        Ok(records)
    }

    /// Whether a record exists for migration `number`
    pub async fn is_applied(&self, number: u64) -> DriftResult<bool> {
        let store = self.store()?;
        let table_name = self.config().get_meta_table_name();

        let item = store
            .get_item(table_name, number_key(number))
            .await
            .map_err(|e| DriftError::store(format!("failed to read migration {}", number), e))?;
        Ok(item.is_some())
    }

    /// Whether `table_name` exists, walking every page of the table listing
    pub async fn find_table(&self, table_name: &str) -> DriftResult<bool> {
        let store = self.store()?;
        store
            .table_exists(table_name, Some(*self.config().get_list_tables_page_size()))
            .await
            .map_err(|e| DriftError::store("failed to list tables", e))
    }

    pub(crate) async fn insert_meta_item(
        &self,
        store: &dyn TableStore,
        record: &MigrationRecord,
    ) -> DriftResult<()> {
        let item = to_item(record)?;
        store
            .put_item(self.config().get_meta_table_name(), item)
            .await
            .map_err(|e| {
                DriftError::store(format!("failed to record migration {}", record.number), e)
            })
    }

    pub(crate) async fn delete_meta_item(&self, store: &dyn TableStore, number: u64) -> DriftResult<()> {
        store
            .delete_item(self.config().get_meta_table_name(), number_key(number))
            .await
            .map_err(|e| DriftError::store(format!("failed to remove migration {}", number), e))
    }
}
