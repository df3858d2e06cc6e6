//! Dry-runs gh-ost for online schema changes.

use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun};
use crate::taskcheck::ports::{CheckExecutorResult, GhostRunner, TaskCheckExecutor};
use async_trait::async_trait;
use std::sync::Arc;

/// Reports whether gh-ost can apply the statement.
pub struct GhostSyncExecutor {
    ghost: Arc<dyn GhostRunner>,
}

impl GhostSyncExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(ghost: Arc<dyn GhostRunner>) -> Self {
        Self { ghost }
    }
}

#[async_trait]
impl TaskCheckExecutor for GhostSyncExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        let target = task.target().connection_target();
        let result = match self.ghost.dry_run(&target, task.payload().statement()).await {
            Ok(()) => TaskCheckResult::success("OK", "gh-ost dry run succeeded"),
            Err(err) => TaskCheckResult::error("gh-ost dry run failed", err.to_string()),
        };
        Ok(vec![result])
    }
}
