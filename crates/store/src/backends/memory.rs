//! In-memory table store backend for development and testing
//!
//! Rows are kept ordered by primary key, so scan order is deterministic and
//! pagination cursors stay valid across pages.

use crate::expression::UpdateExpression;
use crate::{
    AttributeValue, CreateTableRequest, Item, KeySchemaElement, KeyType, ListTablesPage,
    ListTablesRequest, MemoryStoreConfig, ScanPage, ScanRequest, StoreError, StoreResult,
    TableStore, UpdateItemRequest,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// Exact value of an `N` key attribute, `0.digits * 10^exponent`
///
/// Normalized so that equal numbers have equal fields: no leading or trailing
/// zero digits, and zero is `digits = []`, `exponent = 0`, non-negative.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyNumber {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl KeyNumber {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, rest) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match rest.find(['e', 'E']) {
            Some(at) => (&rest[..at], rest[at + 1..].parse::<i64>().ok()?),
            None => (rest, 0),
        };
        let (integer, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }

        let mut digits = Vec::with_capacity(integer.len() + fraction.len());
        for byte in integer.bytes().chain(fraction.bytes()) {
            if !byte.is_ascii_digit() {
                return None;
            }
            digits.push(byte - b'0');
        }

        let leading = digits.iter().take_while(|digit| **digit == 0).count();
        digits.drain(..leading);
        while digits.last() == Some(&0) {
            digits.pop();
        }
        if digits.is_empty() {
            return Some(Self {
                negative: false,
                digits,
                exponent: 0,
            });
        }

        let exponent = i64::try_from(integer.len())
            .ok()?
            .checked_sub(i64::try_from(leading).ok()?)?
            .checked_add(exponent)?;
        Some(Self {
            negative,
            digits,
            exponent,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        match (self.digits.is_empty(), other.digits.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .exponent
                .cmp(&other.exponent)
                .then_with(|| self.digits.cmp(&other.digits)),
        }
    }
}

impl PartialOrd for KeyNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

/// One component of an encoded primary key
#[derive(Debug, Clone)]
enum KeyPart {
    Number(KeyNumber),
    String(String),
    Binary(Vec<u8>),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Number(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Binary(_) => 2,
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Number(a), KeyPart::Number(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.cmp(b),
            (KeyPart::Binary(a), KeyPart::Binary(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

type StoredKey = Vec<KeyPart>;

/// A single table: key schema plus rows ordered by primary key
struct MemoryTable {
    key_schema: Vec<KeySchemaElement>,
    rows: RwLock<BTreeMap<StoredKey, Item>>,
}

impl MemoryTable {
    /// Encode the primary key of `item`, which may carry extra attributes
    fn key_of(&self, item: &Item) -> StoreResult<StoredKey> {
        self.key_schema
            .iter()
            .map(|element| {
                let value = item.get(&element.attribute_name).ok_or_else(|| {
                    StoreError::InvalidKey(format!(
                        "missing key attribute '{}'",
                        element.attribute_name
                    ))
                })?;
                if !element.attribute_type.matches(value) {
                    return Err(StoreError::InvalidKey(format!(
                        "key attribute '{}' must be of type {}, found {}",
                        element.attribute_name,
                        element.attribute_type,
                        value.type_name()
                    )));
                }
                Ok(match value {
                    AttributeValue::N(n) => KeyPart::Number(KeyNumber::parse(n).ok_or_else(|| {
                        StoreError::InvalidKey(format!(
                            "key attribute '{}' is not a valid number: {}",
                            element.attribute_name, n
                        ))
                    })?),
                    AttributeValue::S(s) => KeyPart::String(s.clone()),
                    AttributeValue::B(b) => KeyPart::Binary(b.clone()),
                    _ => unreachable!("scalar type checked above"),
                })
            })
            .collect()
    }

    /// Encode a key that must consist of exactly the key attributes
    fn exact_key(&self, key: &Item) -> StoreResult<StoredKey> {
        let encoded = self.key_of(key)?;
        if key.len() != self.key_schema.len() {
            return Err(StoreError::InvalidKey(
                "key contains attributes that are not part of the key schema".to_string(),
            ));
        }
        Ok(encoded)
    }

    /// Project an item down to its key attributes
    fn key_attributes(&self, item: &Item) -> Item {
        self.key_schema
            .iter()
            .filter_map(|element| {
                item.get(&element.attribute_name)
                    .map(|value| (element.attribute_name.clone(), value.clone()))
            })
            .collect()
    }
}

/// In-memory table store backend
pub struct MemoryStore {
    config: MemoryStoreConfig,
    tables: DashMap<String, Arc<MemoryTable>>,
}

impl MemoryStore {
    /// Create a new memory store with the given configuration
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            tables: DashMap::new(),
        }
    }

    fn table(&self, table_name: &str) -> StoreResult<Arc<MemoryTable>> {
        self.tables
            .get(table_name)
            .map(|table| Arc::clone(table.value()))
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))
    }

    /// Number of items currently stored in a table
    pub fn item_count(&self, table_name: &str) -> StoreResult<usize> {
        Ok(self.table(table_name)?.rows.read().len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

fn validate_key_schema(request: &CreateTableRequest) -> StoreResult<()> {
    let schema = &request.key_schema;
    match schema.first() {
        Some(first) if first.key_type == KeyType::Hash => {}
        _ => {
            return Err(StoreError::InvalidKey(
                "key schema must start with a hash key".to_string(),
            ))
        }
    }
    if schema.len() > 2 || (schema.len() == 2 && schema[1].key_type != KeyType::Range) {
        return Err(StoreError::InvalidKey(
            "key schema allows one hash key and at most one range key".to_string(),
        ));
    }
    if schema.iter().any(|element| element.attribute_name.is_empty()) {
        return Err(StoreError::InvalidKey(
            "key attribute names must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn create_table(&self, request: CreateTableRequest) -> StoreResult<()> {
        if request.table_name.is_empty() {
            return Err(StoreError::Configuration(
                "table name must not be empty".to_string(),
            ));
        }
        validate_key_schema(&request)?;

        if *self.config.get_max_tables() > 0 && self.tables.len() >= *self.config.get_max_tables()
        {
            return Err(StoreError::Configuration(format!(
                "Table limit exceeded: {}",
                *self.config.get_max_tables()
            )));
        }

        match self.tables.entry(request.table_name.clone()) {
            Entry::Occupied(_) => Err(StoreError::TableExists(request.table_name)),
            Entry::Vacant(slot) => {
                debug!("Created in-memory table {}", request.table_name);
                slot.insert(Arc::new(MemoryTable {
                    key_schema: request.key_schema,
                    rows: RwLock::new(BTreeMap::new()),
                }));
                Ok(())
            }
        }
    }

    async fn list_tables(&self, request: ListTablesRequest) -> StoreResult<ListTablesPage> {
        let mut names: Vec<String> = self
            .tables
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| match &request.exclusive_start_table_name {
                Some(start) => name > start,
                None => true,
            })
            .collect();
        names.sort();

        let page_size = request
            .limit
            .map(|limit| (limit as usize).max(1))
            .unwrap_or(usize::MAX)
            .min(*self.config.get_list_tables_page_size())
            .max(1);

        let has_more = names.len() > page_size;
        names.truncate(page_size);
        let last_evaluated_table_name = if has_more { names.last().cloned() } else { None };

        Ok(ListTablesPage {
            table_names: names,
            last_evaluated_table_name,
        })
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ScanPage> {
        let table = self.table(&request.table_name)?;
        let start = match &request.exclusive_start_key {
            Some(key) => Bound::Excluded(table.exact_key(key)?),
            None => Bound::Unbounded,
        };

        let page_size = request
            .limit
            .map(|limit| (limit as usize).max(1))
            .unwrap_or(usize::MAX)
            .min(*self.config.get_max_page_size())
            .max(1);

        let rows = table.rows.read();
        let mut items: Vec<Item> = rows
            .range((start, Bound::Unbounded))
            .take(page_size + 1)
            .map(|(_, item)| item.clone())
            .collect();

        let has_more = items.len() > page_size;
        items.truncate(page_size);
        let last_evaluated_key = if has_more {
            items.last().map(|item| table.key_attributes(item))
        } else {
            None
        };

        Ok(ScanPage {
            items,
            last_evaluated_key,
        })
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        let table = self.table(table_name)?;
        let encoded = table.exact_key(&key)?;
        let item = table.rows.read().get(&encoded).cloned();
        Ok(item)
    }

    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        let table = self.table(table_name)?;
        let encoded = table.key_of(&item)?;
        table.rows.write().insert(encoded, item);
        Ok(())
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        let table = self.table(table_name)?;
        let encoded = table.exact_key(&key)?;
        table.rows.write().remove(&encoded);
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> StoreResult<()> {
        let table = self.table(&request.table_name)?;
        let encoded = table.exact_key(&request.key)?;
        let expression = UpdateExpression::parse(
            &request.update_expression,
            request.expression_attribute_names.as_ref(),
        )?;

        if let Some(target) = expression.targets().find(|target| {
            table
                .key_schema
                .iter()
                .any(|element| element.attribute_name == *target)
        }) {
            return Err(StoreError::InvalidExpression(format!(
                "cannot update key attribute '{}'",
                target
            )));
        }

        let mut rows = table.rows.write();
        let mut updated = rows
            .get(&encoded)
            .cloned()
            .unwrap_or_else(|| request.key.clone());
        expression.apply(&mut updated, &request.expression_attribute_values)?;
        rows.insert(encoded, updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStoreConfigBuilder, ScalarAttributeType};

    fn user(id: u64, name: &str) -> Item {
        let mut item = Item::new();
        item.insert("Id".to_string(), AttributeValue::n(id));
        item.insert("Name".to_string(), AttributeValue::s(name));
        item
    }

    fn key(id: u64) -> Item {
        let mut item = Item::new();
        item.insert("Id".to_string(), AttributeValue::n(id));
        item
    }

    async fn users_store(config: MemoryStoreConfig) -> MemoryStore {
        let store = MemoryStore::new(config);
        store
            .create_table(CreateTableRequest::hash_key(
                "users",
                "Id",
                ScalarAttributeType::N,
            ))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_table_rejects_duplicates() {
        let store = users_store(MemoryStoreConfig::default()).await;
        let err = store
            .create_table(CreateTableRequest::hash_key(
                "users",
                "Id",
                ScalarAttributeType::N,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableExists(name) if name == "users"));
    }

    #[tokio::test]
    async fn test_create_table_validates_key_schema() {
        let store = MemoryStore::default();
        let mut request = CreateTableRequest::hash_key("bad", "Id", ScalarAttributeType::N);
        request.key_schema[0].key_type = KeyType::Range;
        assert!(matches!(
            store.create_table(request).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = users_store(MemoryStoreConfig::default()).await;
        store.put_item("users", user(1, "ada")).await.unwrap();

        let fetched = store.get_item("users", key(1)).await.unwrap();
        assert_eq!(fetched, Some(user(1, "ada")));

        store.put_item("users", user(1, "grace")).await.unwrap();
        assert_eq!(store.item_count("users").unwrap(), 1);

        store.delete_item("users", key(1)).await.unwrap();
        assert_eq!(store.get_item("users", key(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_item_without_key_is_rejected() {
        let store = users_store(MemoryStoreConfig::default()).await;
        let mut item = Item::new();
        item.insert("Name".to_string(), AttributeValue::s("nobody"));
        assert!(matches!(
            store.put_item("users", item).await,
            Err(StoreError::InvalidKey(_))
        ));

        let mut wrong_type = Item::new();
        wrong_type.insert("Id".to_string(), AttributeValue::s("1"));
        assert!(matches!(
            store.get_item("users", wrong_type).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.scan(ScanRequest::new("ghost")).await,
            Err(StoreError::TableNotFound(_))
        ));
        assert!(!store.table_exists("ghost", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_pagination_in_key_order() {
        let store = users_store(MemoryStoreConfig::default()).await;
        for id in [5u64, 1, 4, 2, 3] {
            store.put_item("users", user(id, "u")).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = store
                .scan(ScanRequest::new("users").consistent(true).limit(2).start_after(cursor))
                .await
                .unwrap();
            pages += 1;
            seen.extend(
                page.items
                    .iter()
                    .map(|item| item["Id"].as_n().unwrap().to_string()),
            );
            match page.last_evaluated_key {
                Some(last) => cursor = Some(last),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_scan_respects_max_page_size() {
        let store = users_store(
            MemoryStoreConfigBuilder::testing()
                .build()
                .expect("Failed to build config"),
        )
        .await;
        for id in 1..=3u64 {
            store.put_item("users", user(id, "u")).await.unwrap();
        }

        let page = store.scan(ScanRequest::new("users")).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.last_evaluated_key, Some(key(2)));
    }

    #[tokio::test]
    async fn test_list_tables_pagination() {
        let store = MemoryStore::new(
            MemoryStoreConfigBuilder::testing()
                .build()
                .expect("Failed to build config"),
        );
        for name in ["a", "b", "c", "d", "e"] {
            store
                .create_table(CreateTableRequest::hash_key(name, "Id", ScalarAttributeType::S))
                .await
                .unwrap();
        }

        let first = store.list_tables(ListTablesRequest::default()).await.unwrap();
        assert_eq!(first.table_names, vec!["a", "b"]);
        assert_eq!(first.last_evaluated_table_name.as_deref(), Some("b"));

        assert!(store.table_exists("e", None).await.unwrap());
        assert!(store.table_exists("e", Some(1)).await.unwrap());
        assert!(!store.table_exists("f", Some(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_large_numeric_keys_stay_distinct() {
        let store = users_store(MemoryStoreConfig::default()).await;
        let low = 1u64 << 53;
        store.put_item("users", user(low, "low")).await.unwrap();
        store.put_item("users", user(low + 1, "high")).await.unwrap();
        store.put_item("users", user(u64::MAX, "max")).await.unwrap();

        assert_eq!(store.item_count("users").unwrap(), 3);
        assert_eq!(
            store.get_item("users", key(low + 1)).await.unwrap(),
            Some(user(low + 1, "high"))
        );

        store.delete_item("users", key(low)).await.unwrap();
        assert_eq!(store.item_count("users").unwrap(), 2);
        assert!(store.get_item("users", key(low + 1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_numeric_keys_compare_by_value() {
        let store = users_store(MemoryStoreConfig::default()).await;
        for id in ["10", "-1.5", "0.25", "-2", "0", "1", "1.0", "1e0", "-0", "2.5e1"] {
            let mut item = Item::new();
            item.insert("Id".to_string(), AttributeValue::N(id.to_string()));
            store.put_item("users", item).await.unwrap();
        }

        let page = store.scan(ScanRequest::new("users")).await.unwrap();
        let ids: Vec<&str> = page
            .items
            .iter()
            .map(|item| item["Id"].as_n().unwrap())
            .collect();
        // Equal numbers share a row, holding whichever text was written last
        assert_eq!(ids, vec!["-2", "-1.5", "-0", "0.25", "1e0", "10", "2.5e1"]);

        let mut bad = Item::new();
        bad.insert("Id".to_string(), AttributeValue::N("1.2.3".to_string()));
        assert!(matches!(
            store.put_item("users", bad).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_update_item_upserts() {
        let store = users_store(MemoryStoreConfig::default()).await;
        let mut values = Item::new();
        values.insert(":one".to_string(), AttributeValue::n(1));
        values.insert(":zero".to_string(), AttributeValue::n(0));

        let request = UpdateItemRequest {
            table_name: "users".to_string(),
            key: key(9),
            update_expression: "SET Logins = if_not_exists(Logins, :zero) + :one".to_string(),
            expression_attribute_values: values,
            expression_attribute_names: None,
        };
        store.update_item(request.clone()).await.unwrap();
        store.update_item(request).await.unwrap();

        let item = store.get_item("users", key(9)).await.unwrap().unwrap();
        assert_eq!(item.get("Logins"), Some(&AttributeValue::n(2)));
        assert_eq!(item.get("Id"), Some(&AttributeValue::n(9)));
    }

    #[tokio::test]
    async fn test_update_item_cannot_touch_key() {
        let store = users_store(MemoryStoreConfig::default()).await;
        let mut values = Item::new();
        values.insert(":id".to_string(), AttributeValue::n(2));

        let err = store
            .update_item(UpdateItemRequest {
                table_name: "users".to_string(),
                key: key(1),
                update_expression: "SET Id = :id".to_string(),
                expression_attribute_values: values,
                expression_attribute_names: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidExpression(_)));
        assert_eq!(store.item_count("users").unwrap(), 0);
    }
}
