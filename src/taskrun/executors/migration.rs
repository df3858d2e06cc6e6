//! Applies baselines, schema and data changes through the ledger.

use super::migration_info;
use crate::ledger::domain::MigrationType;
use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::{Task, TaskRunResult, TaskType};
use crate::taskrun::ports::{TaskExecutor, TaskExecutorError, TaskExecutorResult, TaskRunContext};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Hands the task statement to the driver's ledger-protected apply.
///
/// Baseline tasks create the migration history table first.
pub struct MigrationExecutor<C: Clock + Send + Sync> {
    drivers: Arc<dyn DriverProvider>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> MigrationExecutor<C> {
    /// Creates the executor.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverProvider>, clock: Arc<C>) -> Self {
        Self { drivers, clock }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> TaskExecutor for MigrationExecutor<C> {
    async fn run(&self, task: &Task, context: &TaskRunContext) -> TaskExecutorResult<TaskRunResult> {
        let task_type = task.task_type();
        if matches!(task_type, TaskType::DatabaseCreate | TaskType::SchemaUpdateGhost) {
            return Err(TaskExecutorError::Unsupported(task_type));
        }
        let baseline = task_type.migration_type() == MigrationType::Baseline;
        let statement = task.payload().statement();
        if !baseline && statement.trim().is_empty() {
            return Err(TaskExecutorError::EmptyStatement(task_type));
        }

        let target = task.target();
        let driver = self.drivers.open(&target.connection_target()).await?;
        if baseline {
            driver.setup_migration_if_needed().await?;
        }
        let info = migration_info(task, context, &*self.clock)?;
        let history = driver.execute_migration(&info, statement).await?;
        info!(
            task_id = %task.id(),
            namespace = %history.namespace,
            version = %history.version,
            sequence = history.sequence,
            "migration recorded"
        );

        let detail = if baseline {
            format!(
                "Established baseline version {} for database {:?}.",
                history.version, target.database_name
            )
        } else {
            format!(
                "Applied migration version {} to database {:?}.",
                history.version, target.database_name
            )
        };
        Ok(TaskRunResult {
            detail,
            migration_id: Some(history.id),
            version: Some(history.version.to_string()),
        })
    }
}
