//! Callback and action phases of a migration run

use crate::{
    Action, ActionQueue, ActionRecorder, DriftError, DriftResult, ErrorCollector,
    MigrationCallback, TableScanner,
};
use async_trait::async_trait;
use drift_jobs::{Job, JobConfig, JobError, JobManager};
use drift_store::{Item, TableStore, UpdateItemRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) const CALLBACK_JOBS: &str = "migration-callbacks";
pub(crate) const ACTION_JOBS: &str = "migration-actions";
pub(crate) const SCAN: &str = "migration-scan";

/// Limits shared by both phases of a run
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseSettings {
    pub concurrency: usize,
    pub page_size: u32,
    pub job_timeout: Option<Duration>,
}

impl PhaseSettings {
    fn job_config(&self, identifier: &str) -> JobConfig {
        JobConfig::with_limits(identifier, self.concurrency, self.job_timeout)
    }
}

/// Counters from a completed callback phase
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanStats {
    pub pages: usize,
    pub items: usize,
}

struct CallbackJob {
    callback: Arc<dyn MigrationCallback>,
    recorder: ActionRecorder,
    cancel: CancellationToken,
}

#[async_trait]
impl Job for CallbackJob {
    type Args = Item;
    type Error = DriftError;

    async fn run(&self, item: Item) -> DriftResult<()> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled {
                identifier: CALLBACK_JOBS.to_string(),
            }
            .into());
        }
        self.callback
            .call(&item, &self.recorder)
            .map_err(DriftError::Callback)
    }
}

struct ActionJob {
    store: Arc<dyn TableStore>,
    default_table: String,
    cancel: CancellationToken,
}

#[async_trait]
impl Job for ActionJob {
    type Args = Action;
    type Error = DriftError;

    async fn run(&self, action: Action) -> DriftResult<()> {
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled {
                identifier: ACTION_JOBS.to_string(),
            }
            .into());
        }

        let table = action.target_table(&self.default_table).to_string();
        let kind = action.kind();
        let result = match action {
            Action::Update {
                keys,
                values,
                update_expression,
                attribute_names,
                ..
            } => {
                self.store
                    .update_item(UpdateItemRequest {
                        table_name: table.clone(),
                        key: keys,
                        update_expression,
                        expression_attribute_values: values,
                        expression_attribute_names: attribute_names,
                    })
                    .await
            }
            Action::Insert { item, .. } => self.store.put_item(&table, item).await,
            Action::Delete { keys, .. } => self.store.delete_item(&table, keys).await,
        };

        result.map_err(|e| DriftError::store(format!("failed to apply {} to table {}", kind, table), e))
    }
}

/// Run the callback over every item of `table_name`, one page at a time
///
/// Returns the cumulative errors of every processed page when any page
/// reported one. With `fail_on_first_error` no page after the first failing
/// one is fetched.
pub(crate) async fn run_callbacks(
    store: Arc<dyn TableStore>,
    table_name: &str,
    callback: Arc<dyn MigrationCallback>,
    queue: Arc<ActionQueue>,
    settings: PhaseSettings,
    fail_on_first_error: bool,
    cancel: &CancellationToken,
) -> Result<ScanStats, Vec<DriftError>> {
    let collector = Arc::new(ErrorCollector::new());
    let job = CallbackJob {
        callback,
        recorder: ActionRecorder::new(queue),
        cancel: cancel.clone(),
    };
    let mut manager = JobManager::new(job, collector.clone(), settings.job_config(CALLBACK_JOBS));
    let mut scanner =
        TableScanner::new(store, table_name, Some(settings.page_size)).consistent(true);

    let mut stats = ScanStats::default();
    let mut errors = Vec::new();

    loop {
        if cancel.is_cancelled() {
            warn!(table_name = %table_name, pages = stats.pages, "Scan cancelled");
            errors.push(DriftError::Job(JobError::Cancelled {
                identifier: SCAN.to_string(),
            }));
            break;
        }

        let page = match scanner.next_page().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(e) => {
                errors.push(e);
                break;
            }
        };

        stats.pages += 1;
        stats.items += page.len();
        for item in page {
            manager.add_job(item);
        }
        manager.run(cancel).await;

        let page_errors = collector.drain();
        debug!(
            table_name = %table_name,
            page = stats.pages,
            errors = page_errors.len(),
            "Callback page finished"
        );

        let page_failed = !page_errors.is_empty();
        errors.extend(page_errors);
        if page_failed && fail_on_first_error {
            warn!(
                table_name = %table_name,
                page = stats.pages,
                errors = errors.len(),
                "Stopping scan after first failing page"
            );
            break;
        }
    }

    if errors.is_empty() {
        info!(
            table_name = %table_name,
            pages = stats.pages,
            items = stats.items,
            "Callback phase complete"
        );
        Ok(stats)
    } else {
        Err(errors)
    }
}

/// Apply queued actions, defaulting their table to `default_table`
///
/// Actions are applied independently; ones that succeeded before a failure
/// stay applied.
pub(crate) async fn apply_actions(
    store: Arc<dyn TableStore>,
    default_table: &str,
    actions: Vec<Action>,
    settings: PhaseSettings,
    cancel: &CancellationToken,
) -> Result<usize, Vec<DriftError>> {
    let collector = Arc::new(ErrorCollector::new());
    let job = ActionJob {
        store,
        default_table: default_table.to_string(),
        cancel: cancel.clone(),
    };
    let mut manager = JobManager::new(job, collector.clone(), settings.job_config(ACTION_JOBS));

    for action in actions {
        manager.add_job(action);
    }
    let report = manager.run(cancel).await;

    let errors = collector.drain();
    if errors.is_empty() {
        info!(
            table_name = %default_table,
            applied = report.dispatched,
            "Action phase complete"
        );
        Ok(report.dispatched)
    } else {
        warn!(
            table_name = %default_table,
            dispatched = report.dispatched,
            failed = errors.len(),
            "Action phase finished with errors; applied actions are not rolled back"
        );
        Err(errors)
    }
}
