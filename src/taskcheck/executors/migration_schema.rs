//! Checks that the migration history table exists.

use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun};
use crate::taskcheck::ports::{CheckExecutorResult, TaskCheckExecutor};
use async_trait::async_trait;
use std::sync::Arc;

/// Reports an error while the target still needs its migration history
/// table.
pub struct MigrationSchemaExecutor {
    drivers: Arc<dyn DriverProvider>,
}

impl MigrationSchemaExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverProvider>) -> Self {
        Self { drivers }
    }
}

#[async_trait]
impl TaskCheckExecutor for MigrationSchemaExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        let driver = self
            .drivers
            .open(&task.target().connection_target())
            .await?;
        let result = if driver.needs_setup_migration().await? {
            TaskCheckResult::error(
                "Migration schema missing",
                format!(
                    "migration history table is missing on {}; create the migration schema first",
                    task.target().database_name
                ),
            )
        } else {
            TaskCheckResult::success("OK", "migration schema exists")
        };
        Ok(vec![result])
    }
}
