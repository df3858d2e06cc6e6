//! Creates a database and records its baseline.

use super::migration_info;
use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::{Task, TaskRunResult};
use crate::taskrun::ports::{TaskExecutor, TaskExecutorError, TaskExecutorResult, TaskRunContext};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use tracing::debug;

/// Runs the `CREATE DATABASE` statement on the instance, prepares the
/// migration history table, and records a baseline for the new database.
pub struct DatabaseCreateExecutor<C: Clock + Send + Sync> {
    drivers: Arc<dyn DriverProvider>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> DatabaseCreateExecutor<C> {
    /// Creates the executor.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverProvider>, clock: Arc<C>) -> Self {
        Self { drivers, clock }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> TaskExecutor for DatabaseCreateExecutor<C> {
    async fn run(&self, task: &Task, context: &TaskRunContext) -> TaskExecutorResult<TaskRunResult> {
        let statement = task.payload().statement().trim();
        if statement.is_empty() {
            return Err(TaskExecutorError::EmptyStatement(task.task_type()));
        }
        let target = task.target();
        debug!(
            instance_id = %target.instance_id,
            database = %target.database_name,
            "creating database"
        );

        self.drivers
            .open(&target.instance_connection_target())
            .await?
            .execute(statement)
            .await?;

        let driver = self.drivers.open(&target.connection_target()).await?;
        driver.setup_migration_if_needed().await?;
        let info = migration_info(task, context, &*self.clock)?.with_create_database(true);
        let history = driver.execute_migration(&info, statement).await?;

        Ok(TaskRunResult {
            detail: format!("Created database {:?}", target.database_name),
            migration_id: Some(history.id),
            version: Some(history.version.to_string()),
        })
    }
}
