//! # drift
//!
//! Two-phase data migrations for DynamoDB-style key-value tables.
//!
//! A [`Migration`] targets one table. Running it scans every item of that
//! table, hands each item to the migration's callback together with an
//! [`ActionRecorder`], and collects the updates, inserts and deletes the
//! callback queues. Only when every callback succeeded are the queued actions
//! applied, and only when every action succeeded is the migration recorded
//! in the metadata table.
//!
//! ## Features
//!
//! - **Bounded concurrency**: callbacks and actions run on a worker pool whose
//!   size also sets the scan page size (see [`PageSizePolicy`])
//! - **Error aggregation**: failures of concurrent workers are collected and
//!   returned together in a [`RunFailure`]
//! - **Idempotency bookkeeping**: applied migrations are tracked by number and
//!   can be listed with [`Drifter::applied`]
//! - **Cancellation**: runs stop starting new work once their
//!   [`CancellationToken`] fires
//!
//! ## Quick Start
//!
//! ```rust
//! use drift::{ActionRecorder, CancellationToken, Drifter, Item, Migration};
//! use drift_store::{
//!     AttributeValue, CreateTableRequest, MemoryStore, ScalarAttributeType, TableStore,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::default());
//! store
//!     .create_table(CreateTableRequest::hash_key("users", "Id", ScalarAttributeType::N))
//!     .await
//!     .unwrap();
//! let mut user = Item::new();
//! user.insert("Id".to_string(), AttributeValue::n(1));
//! store.put_item("users", user).await.unwrap();
//!
//! let drifter = Drifter::from_store(store.clone());
//! drifter.init(1, 1).await.unwrap();
//!
//! let migration = Migration::new(1, "users", "mark users active").with_callback(
//!     |item: &Item, actions: &ActionRecorder| {
//!         let mut key = Item::new();
//!         key.insert("Id".to_string(), item["Id"].clone());
//!         let mut values = Item::new();
//!         values.insert(":active".to_string(), AttributeValue::Bool(true));
//!         actions.update_item(key, values, "SET Active = :active", None, None)?;
//!         Ok(())
//!     },
//! );
//!
//! let summary = drifter
//!     .run(&migration, 4, true, &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(summary.actions_applied, 1);
//! assert!(drifter.is_applied(1).await.unwrap());
//! # });
//! ```

pub mod action;
pub mod collector;
pub mod config;
pub mod error;
mod executor;
pub mod migration;
pub mod registry;
pub mod runner;
pub mod scanner;

pub use action::{Action, ActionQueue, ActionRecorder};
pub use collector::ErrorCollector;
pub use config::*;
pub use error::{CallbackError, DriftError, DriftResult, ErrorKind, Phase, RunFailure};
pub use migration::{Migration, MigrationCallback, MigrationRecord};
pub use runner::{Drifter, RunSummary};
pub use scanner::TableScanner;

pub use drift_store::{AttributeValue, Item, TableStore};
pub use tokio_util::sync::CancellationToken;
