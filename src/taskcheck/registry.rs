//! Wiring of the built-in check executors.

use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::TaskCheckType;
use crate::registry::{Registry, RegistryBuilder, RegistryError};
use crate::taskcheck::executors::{
    AffectedRowsReportExecutor, DatabaseConnectExecutor, GhostSyncExecutor,
    MigrationSchemaExecutor, StatementAdviseExecutor, StatementTypeExecutor,
};
use crate::taskcheck::ports::{GhostRunner, RowEstimator, SqlAdvisor, TaskCheckExecutor};
use std::sync::Arc;

/// Check executors keyed by the check type they run.
pub type TaskCheckExecutorRegistry = Registry<TaskCheckType, dyn TaskCheckExecutor>;

/// External services the built-in check executors call.
#[derive(Clone)]
pub struct CheckCollaborators {
    /// Opens database drivers.
    pub drivers: Arc<dyn DriverProvider>,
    /// SQL review service.
    pub advisor: Arc<dyn SqlAdvisor>,
    /// gh-ost runner.
    pub ghost: Arc<dyn GhostRunner>,
    /// Affected-row estimator.
    pub estimator: Arc<dyn RowEstimator>,
}

/// Builds the registry of every built-in check executor.
///
/// Data changes estimated to touch more than `affected_rows_warn_above`
/// rows are reported as a warning.
///
/// # Errors
///
/// Returns a [`RegistryError`] when a check type is left without an
/// executor.
pub fn builtin_check_registry(
    collaborators: &CheckCollaborators,
    affected_rows_warn_above: u64,
) -> Result<TaskCheckExecutorRegistry, RegistryError> {
    RegistryBuilder::<TaskCheckType, dyn TaskCheckExecutor>::new("task check executors")
        .register(
            TaskCheckType::DatabaseConnect,
            Arc::new(DatabaseConnectExecutor::new(Arc::clone(&collaborators.drivers))),
        )
        .register(
            TaskCheckType::MigrationSchema,
            Arc::new(MigrationSchemaExecutor::new(Arc::clone(&collaborators.drivers))),
        )
        .register(
            TaskCheckType::StatementAdvise,
            Arc::new(StatementAdviseExecutor::new(Arc::clone(&collaborators.advisor))),
        )
        .register(
            TaskCheckType::StatementType,
            Arc::new(StatementTypeExecutor::new()),
        )
        .register(
            TaskCheckType::GhostSync,
            Arc::new(GhostSyncExecutor::new(Arc::clone(&collaborators.ghost))),
        )
        .register(
            TaskCheckType::AffectedRowsReport,
            Arc::new(
                AffectedRowsReportExecutor::new(Arc::clone(&collaborators.estimator))
                    .with_warn_above(affected_rows_warn_above),
            ),
        )
        .require_all(TaskCheckType::ALL)
        .build()
}
