//! Online schema changes through gh-ost.

use super::migration_info;
use crate::ledger::LedgerError;
use crate::ledger::domain::{MigrationHistory, MigrationHistoryFind, MigrationInfo, MigrationType};
use crate::ledger::ports::{DriverError, DriverProvider};
use crate::pipeline::domain::{Task, TaskRunResult};
use crate::taskcheck::ports::GhostRunner;
use crate::taskrun::ports::{TaskExecutor, TaskExecutorError, TaskExecutorResult, TaskRunContext};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Checks `info` against the recorded history of its namespace with the
/// same rules the ledger applies, so a doomed change never reaches gh-ost.
///
/// # Errors
///
/// Returns [`LedgerError::AlreadyApplied`], [`LedgerError::OutOfOrder`] or
/// [`LedgerError::NoBaseline`].
pub fn precheck_ledger(info: &MigrationInfo, history: &[MigrationHistory]) -> Result<(), LedgerError> {
    let stored = info.version().stored();
    if history.iter().any(|row| row.stored_version() == stored) {
        return Err(LedgerError::AlreadyApplied {
            namespace: info.namespace().clone(),
            version: info.version().to_string(),
        });
    }
    if let Some(applied) = history
        .iter()
        .filter(|row| row.stored_version() > stored)
        .max_by_key(|row| row.stored_version())
    {
        return Err(LedgerError::OutOfOrder {
            namespace: info.namespace().clone(),
            applied: applied.version.to_string(),
            version: info.version().to_string(),
        });
    }
    if !history
        .iter()
        .any(|row| row.migration_type == MigrationType::Baseline)
    {
        return Err(LedgerError::NoBaseline {
            namespace: info.namespace().clone(),
        });
    }
    Ok(())
}

/// Applies the statement with gh-ost, then records it in the ledger without
/// running it again.
pub struct GhostMigrationExecutor<C: Clock + Send + Sync> {
    drivers: Arc<dyn DriverProvider>,
    ghost: Arc<dyn GhostRunner>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> GhostMigrationExecutor<C> {
    /// Creates the executor.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverProvider>, ghost: Arc<dyn GhostRunner>, clock: Arc<C>) -> Self {
        Self {
            drivers,
            ghost,
            clock,
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> TaskExecutor for GhostMigrationExecutor<C> {
    async fn run(&self, task: &Task, context: &TaskRunContext) -> TaskExecutorResult<TaskRunResult> {
        let statement = task.payload().statement();
        if statement.trim().is_empty() {
            return Err(TaskExecutorError::EmptyStatement(task.task_type()));
        }

        let target = task.target().connection_target();
        let driver = self.drivers.open(&target).await?;
        let info = migration_info(task, context, &*self.clock)?;
        let history = driver
            .find_migration_history_list(&MigrationHistoryFind::for_namespace(
                info.namespace().clone(),
            ))
            .await?;
        precheck_ledger(&info, &history).map_err(DriverError::from)?;

        self.ghost.migrate(&target, statement).await?;
        info!(task_id = %task.id(), %target, "gh-ost migration finished");

        let recorded = driver.execute_migration(&info, "").await?;
        Ok(TaskRunResult {
            detail: format!(
                "Applied migration version {} to database {:?} with gh-ost.",
                recorded.version,
                task.target().database_name
            ),
            migration_id: Some(recorded.id),
            version: Some(recorded.version.to_string()),
        })
    }
}
