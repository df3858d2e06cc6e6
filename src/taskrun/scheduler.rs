//! Polls `PENDING` tasks and dispatches them to their executors.

use crate::{
    admission::AdmissionController,
    error::ErrorCode,
    pipeline::{
        domain::{InstanceId, PipelineStatus, Task, TaskStatus},
        ports::{ActivityRecorder, PipelineRepository},
        services::{PipelineServiceResult, PipelineStatusService},
    },
    supervisor::supervise,
    taskrun::{ports::TaskRunContext, registry::TaskExecutorRegistry},
};
use mockable::Clock;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default polling interval.
pub const DEFAULT_TASK_INTERVAL: Duration = Duration::from_secs(1);

type DatabaseKey = (InstanceId, String);

/// Background loop that advances open pipelines and runs due tasks.
///
/// A task is dispatched only while its instance has a free slot, and a
/// sequential task only while no other sequential task holds its database.
/// Workers run concurrently; a failing or panicking worker fails its own
/// task and never the loop.
pub struct TaskScheduler<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivityRecorder + 'static,
    C: Clock + Send + Sync + 'static,
{
    service: PipelineStatusService<R, A, C>,
    executors: TaskExecutorRegistry,
    instance_slots: AdmissionController<InstanceId>,
    database_slots: AdmissionController<DatabaseKey>,
    interval: Duration,
}

impl<R, A, C> TaskScheduler<R, A, C>
where
    R: PipelineRepository + 'static,
    A: ActivityRecorder + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler sharing `instance_slots` with the check scheduler.
    #[must_use]
    pub fn new(
        service: PipelineStatusService<R, A, C>,
        executors: TaskExecutorRegistry,
        instance_slots: AdmissionController<InstanceId>,
    ) -> Self {
        Self {
            service,
            executors,
            instance_slots,
            database_slots: AdmissionController::exclusive(),
            interval: DEFAULT_TASK_INTERVAL,
        }
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fails tasks left `RUNNING` by a previous process, then runs until
    /// `cancellation_token` is cancelled.
    ///
    /// Workers already spawned finish on their own; cancellation only stops
    /// new work from starting.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        match self.service.recover_interrupted_tasks().await {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "failed tasks interrupted by restart"),
            Err(err) => error!(error = %err, "failed to recover interrupted tasks"),
        }

        info!(interval = ?self.interval, "task scheduler started");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => {
                    info!("task scheduler received cancellation signal");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "task scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Advances every open pipeline, then dispatches the runnable `PENDING`
    /// tasks in creation order. Returns the spawned workers.
    ///
    /// # Errors
    ///
    /// Returns the service error when pipelines or tasks cannot be listed.
    /// A task whose issue cannot be loaded stays `PENDING` for the next tick.
    pub async fn tick(&self) -> PipelineServiceResult<Vec<JoinHandle<()>>> {
        let repository = self.service.repository();
        for pipeline in repository.list_pipelines(PipelineStatus::Open).await? {
            if let Err(err) = self.service.advance_pipeline(pipeline.id()).await {
                warn!(pipeline_id = %pipeline.id(), error = %err, "failed to advance pipeline");
            }
        }

        let mut workers = Vec::new();
        for task in repository.list_tasks(TaskStatus::Pending).await? {
            let database_slot = if task.task_type().is_sequential() {
                let key = (task.target().instance_id, task.target().database_name.clone());
                let Some(token) = self.database_slots.try_acquire(key) else {
                    continue;
                };
                Some(token)
            } else {
                None
            };
            let Some(slot) = self.instance_slots.try_acquire(task.target().instance_id) else {
                debug!(
                    task_id = %task.id(),
                    instance_id = %task.target().instance_id,
                    "instance at capacity; task deferred"
                );
                continue;
            };

            let context = match self.context_for(&task).await {
                Ok(context) => context,
                Err(err) => {
                    warn!(
                        task_id = %task.id(),
                        error = %err,
                        "failed to load task context; task deferred"
                    );
                    continue;
                }
            };
            let running = match self.service.mark_running(task.id(), &slot).await {
                Ok(running) => running,
                Err(err) => {
                    debug!(task_id = %task.id(), reason = %err, "task not runnable yet");
                    continue;
                }
            };
            let Some(executor) = self.executors.get(&running.task_type()) else {
                let reason = format!("no executor registered for {}", running.task_type());
                if let Err(err) = self
                    .service
                    .fail_task(running.id(), ErrorCode::NotImplemented, reason)
                    .await
                {
                    error!(task_id = %running.id(), error = %err, "failed to record task outcome");
                }
                continue;
            };

            info!(
                task_id = %running.id(),
                task_type = %running.task_type(),
                instance_id = %running.target().instance_id,
                "dispatching task"
            );
            let service = self.service.clone();
            workers.push(tokio::spawn(async move {
                let task_id = running.id();
                let outcome = supervise(async move { executor.run(&running, &context).await }).await;
                let recorded = match outcome {
                    Ok(Ok(result)) => service.complete_task(task_id, result).await,
                    Ok(Err(err)) => service.fail_task(task_id, err.code(), err.to_string()).await,
                    Err(fault) => {
                        error!(task_id = %task_id, fault = %fault, "task worker crashed");
                        service
                            .fail_task(task_id, ErrorCode::Internal, fault.to_string())
                            .await
                    }
                };
                if let Err(err) = recorded {
                    error!(task_id = %task_id, error = %err, "failed to record task outcome");
                }
                drop(slot);
                drop(database_slot);
            }));
        }
        Ok(workers)
    }

    async fn context_for(&self, task: &Task) -> PipelineServiceResult<TaskRunContext> {
        let issue = self
            .service
            .repository()
            .find_issue_by_pipeline(task.pipeline_id())
            .await?;
        Ok(issue.map_or_else(TaskRunContext::system, |found| TaskRunContext {
            issue_id: Some(found.id()),
            creator: found.creator(),
        }))
    }
}
