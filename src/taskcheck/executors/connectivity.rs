//! Checks that the target database accepts connections.

use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun};
use crate::taskcheck::ports::{CheckExecutorResult, TaskCheckExecutor};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens a driver for the task's database and pings it.
///
/// An unreachable database is a finding, not an executor failure.
pub struct DatabaseConnectExecutor {
    drivers: Arc<dyn DriverProvider>,
}

impl DatabaseConnectExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverProvider>) -> Self {
        Self { drivers }
    }
}

#[async_trait]
impl TaskCheckExecutor for DatabaseConnectExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        let target = task.target().connection_target();
        let reachable = async { self.drivers.open(&target).await?.ping().await }.await;
        Ok(vec![match reachable {
            Ok(()) => TaskCheckResult::success("OK", format!("connected to {target}")),
            Err(err) => TaskCheckResult::error("Failed to connect", err.to_string()),
        }])
    }
}
