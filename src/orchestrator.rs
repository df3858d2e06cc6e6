//! Assembles the status service and both scheduler loops from
//! configuration.

use crate::{
    admission::AdmissionController,
    config::SchedulerConfig,
    pipeline::{
        domain::InstanceId,
        ports::{ActivityRecorder, PipelineRepository},
        services::PipelineStatusService,
    },
    registry::RegistryError,
    taskcheck::{CheckCollaborators, TaskCheckScheduler, builtin_check_registry},
    taskrun::{TaskScheduler, builtin_task_registry},
};
use mockable::Clock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The check and task schedulers wired to one status service and one set of
/// per-instance connection slots.
pub struct Orchestrator<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivityRecorder + 'static,
    C: Clock + Send + Sync + 'static,
{
    service: PipelineStatusService<R, A, C>,
    instance_slots: AdmissionController<InstanceId>,
    checks: TaskCheckScheduler<R, C>,
    tasks: TaskScheduler<R, A, C>,
}

impl<R, A, C> Orchestrator<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivityRecorder + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Builds the built-in executor registries and both schedulers with the
    /// intervals, connection cap, severity thresholds and affected-row limit
    /// of `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when a built-in registry is incomplete.
    pub fn with_config(
        config: &SchedulerConfig,
        repository: Arc<R>,
        activity: Arc<A>,
        clock: Arc<C>,
        collaborators: &CheckCollaborators,
    ) -> Result<Self, RegistryError> {
        let service =
            PipelineStatusService::new(Arc::clone(&repository), activity, Arc::clone(&clock))
                .with_thresholds(
                    config.run_threshold.status(),
                    config.auto_approve_threshold.status(),
                );
        let instance_slots = AdmissionController::new(config.max_instance_connections);

        let checks = TaskCheckScheduler::new(
            repository,
            builtin_check_registry(collaborators, config.affected_rows_warn_above)?,
            instance_slots.clone(),
            Arc::clone(&clock),
        )
        .with_interval(config.check_interval());
        let tasks = TaskScheduler::new(
            service.clone(),
            builtin_task_registry(&collaborators.drivers, &collaborators.ghost, &clock)?,
            instance_slots.clone(),
        )
        .with_interval(config.task_interval());

        Ok(Self {
            service,
            instance_slots,
            checks,
            tasks,
        })
    }

    /// Returns the status service the task scheduler uses.
    #[must_use]
    pub const fn service(&self) -> &PipelineStatusService<R, A, C> {
        &self.service
    }

    /// Returns the connection slots shared by both schedulers.
    #[must_use]
    pub const fn instance_slots(&self) -> &AdmissionController<InstanceId> {
        &self.instance_slots
    }

    /// Runs both schedulers until `cancellation_token` is cancelled.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            max_instance_connections = self.instance_slots.capacity(),
            "orchestrator started"
        );
        tokio::join!(
            self.checks.run(cancellation_token.clone()),
            self.tasks.run(cancellation_token),
        );
        info!("orchestrator stopped");
    }
}
