//! Reports the rows a data change is estimated to touch.

use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun, TaskType};
use crate::taskcheck::ports::{CheckExecutorResult, RowEstimator, TaskCheckExecutor};
use async_trait::async_trait;
use std::sync::Arc;

/// Default number of rows above which a data change is reported as a warning.
pub const DEFAULT_AFFECTED_ROWS_WARN_ABOVE: u64 = 1_000;

/// Reports estimated affected rows; large changes are a warning.
pub struct AffectedRowsReportExecutor {
    estimator: Arc<dyn RowEstimator>,
    warn_above: u64,
}

impl AffectedRowsReportExecutor {
    /// Creates the executor with the default warning limit.
    #[must_use]
    pub fn new(estimator: Arc<dyn RowEstimator>) -> Self {
        Self {
            estimator,
            warn_above: DEFAULT_AFFECTED_ROWS_WARN_ABOVE,
        }
    }

    /// Sets the row count above which a warning is reported.
    #[must_use]
    pub fn with_warn_above(mut self, warn_above: u64) -> Self {
        self.warn_above = warn_above;
        self
    }
}

#[async_trait]
impl TaskCheckExecutor for AffectedRowsReportExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        let engine = task.target().engine;
        if task.task_type() != TaskType::DataUpdate || !engine.capabilities().affected_rows_report {
            return Ok(Vec::new());
        }

        let target = task.target().connection_target();
        let result = match self
            .estimator
            .estimate(&target, task.payload().statement())
            .await
        {
            Ok(rows) if rows > self.warn_above => TaskCheckResult::warn(
                "Large data change",
                format!("{rows} rows affected, more than {}", self.warn_above),
            ),
            Ok(rows) => TaskCheckResult::success("OK", rows.to_string()),
            Err(err) => TaskCheckResult::error(
                "Failed to report statement affected rows",
                err.to_string(),
            ),
        };
        Ok(vec![result])
    }
}
