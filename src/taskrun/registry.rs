//! Wiring of the built-in task executors.

use crate::ledger::ports::DriverProvider;
use crate::pipeline::domain::TaskType;
use crate::registry::{Registry, RegistryBuilder, RegistryError};
use crate::taskcheck::ports::GhostRunner;
use crate::taskrun::executors::{DatabaseCreateExecutor, GhostMigrationExecutor, MigrationExecutor};
use crate::taskrun::ports::TaskExecutor;
use mockable::Clock;
use std::sync::Arc;

/// Task executors keyed by the task type they run.
pub type TaskExecutorRegistry = Registry<TaskType, dyn TaskExecutor>;

/// Builds the registry of every built-in task executor.
///
/// One [`MigrationExecutor`] serves baselines and schema, SDL and data
/// updates.
///
/// # Errors
///
/// Returns a [`RegistryError`] when a task type is left without an executor.
pub fn builtin_task_registry<C>(
    drivers: &Arc<dyn DriverProvider>,
    ghost: &Arc<dyn GhostRunner>,
    clock: &Arc<C>,
) -> Result<TaskExecutorRegistry, RegistryError>
where
    C: Clock + Send + Sync + 'static,
{
    let migration: Arc<dyn TaskExecutor> =
        Arc::new(MigrationExecutor::new(Arc::clone(drivers), Arc::clone(clock)));
    [
        TaskType::SchemaBaseline,
        TaskType::SchemaUpdate,
        TaskType::SchemaUpdateSdl,
        TaskType::DataUpdate,
    ]
    .into_iter()
    .fold(
        RegistryBuilder::<TaskType, dyn TaskExecutor>::new("task executors"),
        |builder, task_type| builder.register(task_type, Arc::clone(&migration)),
    )
    .register(
        TaskType::DatabaseCreate,
        Arc::new(DatabaseCreateExecutor::new(Arc::clone(drivers), Arc::clone(clock))),
    )
    .register(
        TaskType::SchemaUpdateGhost,
        Arc::new(GhostMigrationExecutor::new(
            Arc::clone(drivers),
            Arc::clone(ghost),
            Arc::clone(clock),
        )),
    )
    .require_all(TaskType::ALL)
    .build()
}
