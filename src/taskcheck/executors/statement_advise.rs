//! Runs the SQL advisor over the task statement.

use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun};
use crate::taskcheck::ports::{CheckExecutorResult, SqlAdvisor, TaskCheckExecutor};
use async_trait::async_trait;
use std::sync::Arc;

/// Namespace of results reported by the SQL advisor.
pub const ADVISOR_NAMESPACE: &str = "gropius.advisor";

/// Maps each advice one-to-one onto a check result.
pub struct StatementAdviseExecutor {
    advisor: Arc<dyn SqlAdvisor>,
}

impl StatementAdviseExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(advisor: Arc<dyn SqlAdvisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl TaskCheckExecutor for StatementAdviseExecutor {
    async fn run(
        &self,
        _run: &TaskCheckRun,
        task: &Task,
    ) -> CheckExecutorResult<Vec<TaskCheckResult>> {
        let engine = task.target().engine;
        if !engine.capabilities().sql_review {
            return Ok(Vec::new());
        }

        let advice = self
            .advisor
            .check(engine, task.payload().statement())
            .await?;
        if advice.is_empty() {
            return Ok(vec![
                TaskCheckResult::success("OK", "").with_rule(ADVISOR_NAMESPACE, 0),
            ]);
        }
        Ok(advice
            .into_iter()
            .map(|item| TaskCheckResult {
                line: item.line,
                column: item.column,
                ..TaskCheckResult::new(item.status, item.title, item.content)
                    .with_rule(ADVISOR_NAMESPACE, item.code)
            })
            .collect())
    }
}
