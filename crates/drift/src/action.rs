//! Deferred mutations queued by migration callbacks

use crate::{DriftError, DriftResult};
use drift_store::{to_item, Item};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One pending mutation
///
/// `table` names the table the mutation applies to. `None` and `Some("")`
/// both mean the table of the migration that queued it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Update {
        keys: Item,
        values: Item,
        update_expression: String,
        attribute_names: Option<HashMap<String, String>>,
        table: Option<String>,
    },
    Insert {
        item: Item,
        table: Option<String>,
    },
    Delete {
        keys: Item,
        table: Option<String>,
    },
}

impl Action {
    /// Explicit table override, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            Action::Update { table, .. }
            | Action::Insert { table, .. }
            | Action::Delete { table, .. } => table.as_deref(),
        }
    }

    /// Table the action applies to when queued by a migration targeting `default_table`
    pub fn target_table<'a>(&'a self, default_table: &'a str) -> &'a str {
        match self.table() {
            Some(table) if !table.is_empty() => table,
            _ => default_table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Update { .. } => "update",
            Action::Insert { .. } => "insert",
            Action::Delete { .. } => "delete",
        }
    }
}

/// Ordered, lock-guarded collection of pending actions for one run
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: Mutex<Vec<Action>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: Action) {
        self.actions.lock().push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Remove and return every queued action in append order
    pub fn take(&self) -> Vec<Action> {
        std::mem::take(&mut *self.actions.lock())
    }
}

fn owned_table(table: Option<&str>) -> Option<String> {
    table.map(str::to_string)
}

/// Handle passed to migration callbacks for queueing mutations
///
/// Recording only marshals the arguments and appends to the run's queue; no
/// store call happens until every callback of the run has succeeded. The
/// recorder is lent to callbacks for the duration of a call and cannot be
/// kept past it.
#[derive(Debug)]
pub struct ActionRecorder {
    queue: Arc<ActionQueue>,
}

impl ActionRecorder {
    pub(crate) fn new(queue: Arc<ActionQueue>) -> Self {
        Self { queue }
    }

    /// Queue an update expression against the item identified by `keys`
    ///
    /// `values` must marshal to a map of `:placeholder` names. Fails with
    /// [`DriftError::InvalidAction`] when the expression is empty.
    pub fn update<K, V>(
        &self,
        keys: &K,
        values: &V,
        update_expression: &str,
        attribute_names: Option<HashMap<String, String>>,
        table: Option<&str>,
    ) -> DriftResult<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        self.update_item(
            to_item(keys)?,
            to_item(values)?,
            update_expression,
            attribute_names,
            table,
        )
    }

    /// Queue an unconditional write of `item`
    pub fn insert<T: Serialize + ?Sized>(&self, item: &T, table: Option<&str>) -> DriftResult<()> {
        self.insert_item(to_item(item)?, table);
        Ok(())
    }

    /// Queue a delete of the item identified by `keys`
    pub fn delete<K: Serialize + ?Sized>(&self, keys: &K, table: Option<&str>) -> DriftResult<()> {
        self.delete_key(to_item(keys)?, table);
        Ok(())
    }

    /// Queue an update with already marshaled keys and values
    pub fn update_item(
        &self,
        keys: Item,
        values: Item,
        update_expression: &str,
        attribute_names: Option<HashMap<String, String>>,
        table: Option<&str>,
    ) -> DriftResult<()> {
        if update_expression.trim().is_empty() {
            return Err(DriftError::InvalidAction(
                "update requires a non-empty update expression".to_string(),
            ));
        }

        self.queue.push(Action::Update {
            keys,
            values,
            update_expression: update_expression.to_string(),
            attribute_names,
            table: owned_table(table),
        });
        Ok(())
    }

    /// Queue an unconditional write of an already marshaled item
    pub fn insert_item(&self, item: Item, table: Option<&str>) {
        self.queue.push(Action::Insert {
            item,
            table: owned_table(table),
        });
    }

    /// Queue a delete by already marshaled key
    pub fn delete_key(&self, keys: Item, table: Option<&str>) {
        self.queue.push(Action::Delete {
            keys,
            table: owned_table(table),
        });
    }

    /// Number of actions queued so far in this run
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
