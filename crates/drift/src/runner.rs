//! Top-level orchestration of migration runs

use crate::executor::{apply_actions, run_callbacks, PhaseSettings};
use crate::{
    ActionQueue, DriftError, DriftResult, DrifterConfig, Migration, MigrationCallback,
    MigrationRecord, Phase, RunFailure,
};
use drift_store::TableStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counters from a successful run or undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub number: u64,
    pub items_scanned: usize,
    pub pages: usize,
    pub actions_applied: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Apply,
    Revert,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Apply => f.write_str("run"),
            Direction::Revert => f.write_str("undo"),
        }
    }
}

/// Migration engine bound to a table store
pub struct Drifter {
    store: Option<Arc<dyn TableStore>>,
    config: DrifterConfig,
}

impl Drifter {
    /// Create an engine without a store; every operation fails with
    /// [`DriftError::Config`] until one is attached with [`Drifter::with_store`]
    pub fn new(config: DrifterConfig) -> Self {
        Self {
            store: None,
            config,
        }
    }

    /// Create an engine with the default configuration
    pub fn from_store(store: Arc<dyn TableStore>) -> Self {
        Self::new(DrifterConfig::default()).with_store(store)
    }

    pub fn with_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &DrifterConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> DriftResult<&Arc<dyn TableStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| DriftError::Config("no table store configured".to_string()))
    }

    /// Apply `migration` and record it as applied
    ///
    /// Every item of the migration's table is passed to its callback, then the
    /// queued actions are applied. The metadata record is written only when
    /// both phases finish without errors. A `concurrency` of 0 is treated as 1.
    pub async fn run(
        &self,
        migration: &Migration,
        concurrency: usize,
        fail_on_first_error: bool,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunFailure> {
        self.execute(Direction::Apply, migration, concurrency, fail_on_first_error, cancel)
            .await
    }

    /// Revert `migration` by running its (inverse) callback and removing its record
    pub async fn undo(
        &self,
        migration: &Migration,
        concurrency: usize,
        fail_on_first_error: bool,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunFailure> {
        self.execute(Direction::Revert, migration, concurrency, fail_on_first_error, cancel)
            .await
    }

    async fn execute(
        &self,
        direction: Direction,
        migration: &Migration,
        concurrency: usize,
        fail_on_first_error: bool,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunFailure> {
        let run_id = Uuid::new_v4();
        let concurrency = concurrency.max(1);
        let mut state = Phase::Preflight;

        info!(
            run_id = %run_id,
            direction = %direction,
            number = migration.number,
            table_name = %migration.table_name,
            concurrency,
            fail_on_first_error,
            "Starting migration"
        );

        let (store, callback) = self
            .preflight(migration)
            .await
            .map_err(|e| abort(run_id, state, vec![e]))?;

        let settings = PhaseSettings {
            concurrency,
            page_size: self.config.get_page_size().page_size(concurrency),
            job_timeout: *self.config.get_job_timeout(),
        };

        transition(run_id, &mut state, Phase::CallbackPhase);
        let queue = Arc::new(ActionQueue::new());
        let stats = run_callbacks(
            Arc::clone(&store),
            &migration.table_name,
            callback,
            Arc::clone(&queue),
            settings,
            fail_on_first_error,
            cancel,
        )
        .await
        .map_err(|errors| abort(run_id, state, errors))?;

        transition(run_id, &mut state, Phase::ActionPhase);
        let actions = queue.take();
        let actions_applied = apply_actions(
            Arc::clone(&store),
            &migration.table_name,
            actions,
            settings,
            cancel,
        )
        .await
        .map_err(|errors| abort(run_id, state, errors))?;

        transition(run_id, &mut state, Phase::Commit);
        let committed = match direction {
            Direction::Apply => {
                self.insert_meta_item(store.as_ref(), &MigrationRecord::from(migration))
                    .await
            }
            Direction::Revert => self.delete_meta_item(store.as_ref(), migration.number).await,
        };
        committed.map_err(|e| abort(run_id, state, vec![e]))?;

        transition(run_id, &mut state, Phase::Done);
        info!(
            run_id = %run_id,
            direction = %direction,
            number = migration.number,
            items = stats.items,
            actions = actions_applied,
            "Migration complete"
        );

        Ok(RunSummary {
            run_id,
            number: migration.number,
            items_scanned: stats.items,
            pages: stats.pages,
            actions_applied,
        })
    }

    async fn preflight(
        &self,
        migration: &Migration,
    ) -> DriftResult<(Arc<dyn TableStore>, Arc<dyn MigrationCallback>)> {
        let store = Arc::clone(self.store()?);

        if migration.table_name.is_empty() {
            return Err(DriftError::InvalidMigration(format!(
                "migration {} has no table name",
                migration.number
            )));
        }
        let callback = migration.callback().cloned().ok_or_else(|| {
            DriftError::InvalidMigration(format!("migration {} has no callback", migration.number))
        })?;

        if !self.find_table(&migration.table_name).await? {
            return Err(DriftError::NotFound(migration.table_name.clone()));
        }
        Ok((store, callback))
    }
}

fn transition(run_id: Uuid, state: &mut Phase, next: Phase) {
    debug!(run_id = %run_id, "{} -> {}", state, next);
    *state = next;
}

fn abort(run_id: Uuid, phase: Phase, errors: Vec<DriftError>) -> RunFailure {
    warn!(
        run_id = %run_id,
        phase = %phase,
        errors = errors.len(),
        "{} -> {}",
        phase,
        Phase::Aborted
    );
    for error in &errors {
        debug!(run_id = %run_id, error = %error, "Migration error");
    }
    RunFailure::new(phase, errors)
}
