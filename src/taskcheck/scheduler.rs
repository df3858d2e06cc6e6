//! Polls `RUNNING` check runs and dispatches them to their executors.

use crate::{
    admission::AdmissionController,
    error::ErrorCode,
    pipeline::{
        domain::{InstanceId, TaskCheckRun, TaskCheckRunId, TaskCheckRunStatus},
        ports::{
            PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult,
            TaskCheckRunFind,
        },
    },
    supervisor::{WorkerFault, supervise},
    taskcheck::registry::TaskCheckExecutorRegistry,
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default polling interval.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Background loop that executes pending check runs.
///
/// Each run is executed by at most one worker at a time, and every worker
/// holds a slot of the instance its task targets. A worker that panics or
/// errors finishes its run as `FAILED`; the loop keeps going.
pub struct TaskCheckScheduler<R, C>
where
    R: PipelineRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    repository: Arc<R>,
    executors: TaskCheckExecutorRegistry,
    instance_slots: AdmissionController<InstanceId>,
    executing: AdmissionController<TaskCheckRunId>,
    clock: Arc<C>,
    interval: Duration,
}

impl<R, C> TaskCheckScheduler<R, C>
where
    R: PipelineRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a scheduler sharing `instance_slots` with the task scheduler.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        executors: TaskCheckExecutorRegistry,
        instance_slots: AdmissionController<InstanceId>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            executors,
            instance_slots,
            executing: AdmissionController::exclusive(),
            clock,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns `true` while a worker is executing `run_id`.
    #[must_use]
    pub fn is_executing(&self, run_id: TaskCheckRunId) -> bool {
        self.executing.is_held(&run_id)
    }

    /// Runs until `cancellation_token` is cancelled.
    ///
    /// Workers already spawned finish on their own.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(interval = ?self.interval, "task check scheduler started");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancellation_token.cancelled() => {
                    info!("task check scheduler received cancellation signal");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "task check scheduler tick failed");
                    }
                }
            }
        }
    }

    /// Dispatches every `RUNNING` check run that is not already executing
    /// and whose instance has a free slot. Returns the spawned workers.
    ///
    /// # Errors
    ///
    /// Returns the repository error when the runs cannot be listed. A run
    /// whose task cannot be loaded is skipped until the next tick.
    pub async fn tick(&self) -> PipelineRepositoryResult<Vec<JoinHandle<()>>> {
        let runs = self
            .repository
            .list_task_check_runs(&TaskCheckRunFind::with_status(TaskCheckRunStatus::Running))
            .await?;

        let mut workers = Vec::new();
        for run in runs {
            let Some(claim) = self.executing.try_acquire(run.id()) else {
                continue;
            };
            let found = match self.repository.find_task(run.task_id()).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        check_run_id = %run.id(),
                        task_id = %run.task_id(),
                        error = %err,
                        "failed to load task; check run deferred"
                    );
                    continue;
                }
            };
            let Some(task) = found else {
                let failed = run.failed(
                    ErrorCode::Internal,
                    format!("task {} not found", run.task_id()),
                    &*self.clock,
                );
                settle(&*self.repository, &failed).await;
                continue;
            };
            let Some(executor) = self.executors.get(&run.check_type()) else {
                let failed = run.failed(
                    ErrorCode::NotImplemented,
                    format!("no executor registered for {}", run.check_type()),
                    &*self.clock,
                );
                settle(&*self.repository, &failed).await;
                continue;
            };
            let Some(slot) = self.instance_slots.try_acquire(task.target().instance_id) else {
                debug!(
                    check_run_id = %run.id(),
                    instance_id = %task.target().instance_id,
                    "instance at capacity; check run deferred"
                );
                continue;
            };

            debug!(
                check_run_id = %run.id(),
                check_type = %run.check_type(),
                task_id = %task.id(),
                "executing check run"
            );
            let repository = Arc::clone(&self.repository);
            let clock = Arc::clone(&self.clock);
            workers.push(tokio::spawn(async move {
                let attempt = run.clone();
                let outcome = supervise(async move { executor.run(&attempt, &task).await }).await;
                let finished = match outcome {
                    Ok(Ok(results)) => run.completed(results, &*clock),
                    Ok(Err(err)) => run.failed(err.code(), err.to_string(), &*clock),
                    Err(WorkerFault::Panicked(message)) => run.failed(
                        ErrorCode::Internal,
                        format!("executor panicked: {message}"),
                        &*clock,
                    ),
                    Err(WorkerFault::Cancelled) => run.failed(
                        ErrorCode::Internal,
                        "executor was cancelled",
                        &*clock,
                    ),
                };
                settle(&*repository, &finished).await;
                drop(slot);
                drop(claim);
            }));
        }
        Ok(workers)
    }
}

async fn settle<R: PipelineRepository>(repository: &R, run: &TaskCheckRun) {
    match repository.finish_task_check_run(run).await {
        Ok(()) => info!(
            check_run_id = %run.id(),
            check_type = %run.check_type(),
            status = ?run.status(),
            "check run finished"
        ),
        Err(PipelineRepositoryError::CheckRunSettled(id)) => {
            debug!(check_run_id = %id, "check run already finished elsewhere");
        }
        Err(err) => warn!(check_run_id = %run.id(), error = %err, "failed to record check run"),
    }
}
