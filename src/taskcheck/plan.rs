//! Which checks guard which task.

use crate::engine::EngineCapabilities;
use crate::pipeline::domain::{TaskCheckType, TaskType};

/// Returns the checks a task of `task_type` needs on an engine advertising
/// `capabilities`, in execution order.
///
/// Database creation has nothing to validate against yet. Baselines only
/// need a reachable database: applying one creates the migration history
/// table.
#[must_use]
pub fn plan_checks(task_type: TaskType, capabilities: EngineCapabilities) -> Vec<TaskCheckType> {
    let mut checks = Vec::new();
    match task_type {
        TaskType::DatabaseCreate => return checks,
        TaskType::SchemaBaseline => {
            checks.push(TaskCheckType::DatabaseConnect);
            return checks;
        }
        TaskType::SchemaUpdate
        | TaskType::SchemaUpdateSdl
        | TaskType::SchemaUpdateGhost
        | TaskType::DataUpdate => {
            checks.extend([TaskCheckType::DatabaseConnect, TaskCheckType::MigrationSchema]);
        }
    }

    if capabilities.sql_review {
        checks.push(TaskCheckType::StatementAdvise);
    }
    if capabilities.statement_type_check {
        checks.push(TaskCheckType::StatementType);
    }
    if task_type == TaskType::DataUpdate && capabilities.affected_rows_report {
        checks.push(TaskCheckType::AffectedRowsReport);
    }
    if task_type == TaskType::SchemaUpdateGhost {
        checks.push(TaskCheckType::GhostSync);
    }
    checks
}
