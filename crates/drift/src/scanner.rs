//! Cursor-driven pagination over a table's contents

use crate::{DriftError, DriftResult};
use drift_store::{Item, ScanRequest, TableStore};
use std::sync::Arc;
use tracing::debug;

/// Walks a full table one store page at a time
pub struct TableScanner {
    store: Arc<dyn TableStore>,
    table_name: String,
    page_size: Option<u32>,
    consistent_read: bool,
    cursor: Option<Item>,
    exhausted: bool,
    pages: usize,
}

impl TableScanner {
    /// `page_size` of `None` leaves the page size to the store
    pub fn new(store: Arc<dyn TableStore>, table_name: impl Into<String>, page_size: Option<u32>) -> Self {
        Self {
            store,
            table_name: table_name.into(),
            page_size,
            consistent_read: false,
            cursor: None,
            exhausted: false,
            pages: 0,
        }
    }

    pub fn consistent(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Fetch the next page, or `None` once the store reports no further pages
    pub async fn next_page(&mut self) -> DriftResult<Option<Vec<Item>>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut request = ScanRequest::new(self.table_name.clone())
            .consistent(self.consistent_read)
            .start_after(self.cursor.take());
        if let Some(limit) = self.page_size {
            request = request.limit(limit);
        }

        let page = self.store.scan(request).await.map_err(|e| {
            DriftError::store(format!("failed to scan table {}", self.table_name), e)
        })?;

        self.pages += 1;
        self.cursor = page.last_evaluated_key;
        self.exhausted = self.cursor.is_none();

        debug!(
            table_name = %self.table_name,
            page = self.pages,
            items = page.items.len(),
            more = !self.exhausted,
            "Scanned page"
        );
        Ok(Some(page.items))
    }

    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use drift_store::{
        AttributeValue, CreateTableRequest, MemoryStore, MemoryStoreConfig, ScalarAttributeType,
    };

    async fn store_with_items(count: u64) -> Arc<dyn TableStore> {
        let store = MemoryStore::new(MemoryStoreConfig::default());
        store
            .create_table(CreateTableRequest::hash_key("users", "Id", ScalarAttributeType::N))
            .await
            .unwrap();
        for id in 1..=count {
            let mut item = Item::new();
            item.insert("Id".to_string(), AttributeValue::n(id));
            store.put_item("users", item).await.unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_scanner_visits_every_item_once() {
        let store = store_with_items(7).await;
        let mut scanner = TableScanner::new(store, "users", Some(3)).consistent(true);

        let mut ids = Vec::new();
        let mut sizes = Vec::new();
        while let Some(page) = scanner.next_page().await.unwrap() {
            sizes.push(page.len());
            for item in page {
                ids.push(item["Id"].as_n().unwrap().to_string());
            }
        }

        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(ids, vec!["1", "2", "3", "4", "5", "6", "7"]);
        assert_eq!(scanner.pages(), 3);
        assert!(scanner.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_table_yields_one_empty_page() {
        let store = store_with_items(0).await;
        let mut scanner = TableScanner::new(store, "users", None);

        assert_eq!(scanner.next_page().await.unwrap(), Some(Vec::new()));
        assert_eq!(scanner.next_page().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_table_is_store_error() {
        let store: Arc<dyn TableStore> = Arc::new(MemoryStore::default());
        let mut scanner = TableScanner::new(store, "ghost", Some(1));

        let err = scanner.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
