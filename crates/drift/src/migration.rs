//! Migration definitions and their persisted records

use crate::{ActionRecorder, CallbackError};
use drift_store::Item;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Per-item migration logic
///
/// Invoked once for every scanned item, possibly from many tasks at once.
/// Implementations inspect the item and queue mutations on the recorder; the
/// item itself is a copy and changing it has no effect on the store.
pub trait MigrationCallback: Send + Sync {
    fn call(&self, item: &Item, recorder: &ActionRecorder) -> Result<(), CallbackError>;
}

impl<F> MigrationCallback for F
where
    F: Fn(&Item, &ActionRecorder) -> Result<(), CallbackError> + Send + Sync,
{
    fn call(&self, item: &Item, recorder: &ActionRecorder) -> Result<(), CallbackError> {
        self(item, recorder)
    }
}

/// A numbered data migration targeting one table
#[derive(Clone)]
pub struct Migration {
    pub number: u64,
    pub table_name: String,
    pub description: String,
    callback: Option<Arc<dyn MigrationCallback>>,
}

impl Migration {
    pub fn new(number: u64, table_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            number,
            table_name: table_name.into(),
            description: description.into(),
            callback: None,
        }
    }

    /// Set the per-item callback from a closure
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Item, &ActionRecorder) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Set a callback shared with other migrations
    pub fn with_shared_callback(mut self, callback: Arc<dyn MigrationCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn callback(&self) -> Option<&Arc<dyn MigrationCallback>> {
        self.callback.as_ref()
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("number", &self.number)
            .field("table_name", &self.table_name)
            .field("description", &self.description)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Persisted record of an applied migration, keyed by `Number`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MigrationRecord {
    pub number: u64,
    pub table_name: String,
    pub description: String,
}

impl From<&Migration> for MigrationRecord {
    fn from(migration: &Migration) -> Self {
        Self {
            number: migration.number,
            table_name: migration.table_name.clone(),
            description: migration.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_store::{from_item, to_item, AttributeValue};

    #[test]
    fn test_record_projection_omits_callback() {
        let migration = Migration::new(3, "users", "backfill emails")
            .with_callback(|_item: &Item, _recorder: &ActionRecorder| Ok(()));
        assert!(migration.callback().is_some());

        let record = MigrationRecord::from(&migration);
        assert_eq!(
            record,
            MigrationRecord {
                number: 3,
                table_name: "users".to_string(),
                description: "backfill emails".to_string(),
            }
        );
    }

    #[test]
    fn test_record_item_layout() {
        let record = MigrationRecord {
            number: 12,
            table_name: "users".to_string(),
            description: "split name".to_string(),
        };

        let item = to_item(&record).unwrap();
        assert_eq!(item.get("Number"), Some(&AttributeValue::n(12)));
        assert_eq!(item.get("TableName"), Some(&AttributeValue::s("users")));
        assert_eq!(item.get("Description"), Some(&AttributeValue::s("split name")));

        let decoded: MigrationRecord = from_item(&item).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_shared_callback_is_the_same_instance() {
        let callback: Arc<dyn MigrationCallback> =
            Arc::new(|_item: &Item, _recorder: &ActionRecorder| -> Result<(), CallbackError> {
                Ok(())
            });
        let forward = Migration::new(1, "users", "forward").with_shared_callback(callback.clone());
        let replay = Migration::new(2, "users", "replay").with_shared_callback(callback.clone());

        assert!(Arc::ptr_eq(forward.callback().unwrap(), &callback));
        assert!(Arc::ptr_eq(replay.callback().unwrap(), &callback));
        assert_eq!(Arc::strong_count(&callback), 3);
    }

    #[test]
    fn test_debug_hides_callback() {
        let migration = Migration::new(1, "users", "noop");
        let debug = format!("{:?}", migration);
        assert!(debug.contains("has_callback: false"));
    }
}
