//! Pipeline state service: issue lifecycle, task status changes and the
//! guards in front of `RUNNING`.

use super::{
    error::{GuardViolation, PipelineServiceError, PipelineServiceResult},
    gate::{CheckVerdict, evaluate_checks},
    permissions::actor_may_change_status,
};
use crate::{
    admission::AdmissionToken,
    error::ErrorCode,
    pipeline::{
        domain::{
            Actor, ActorId, ApprovalPolicy, InstanceId, Issue, IssueId, IssueStatus, NewStage,
            Pipeline, PipelineId, PipelineStatus, Task, TaskCheckRun, TaskCheckStatus,
            TaskCheckType, TaskId, TaskRunResult, TaskStatus,
        },
        ports::{
            ActivityRecorder, PipelineRepository, PipelineRepositoryError, TaskCheckRunFind,
            TaskStatusActivity,
        },
    },
    taskcheck::plan_checks,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Comment recorded on tasks found `RUNNING` when the scheduler starts.
pub const INTERRUPTED_COMMENT: &str = "interrupted by scheduler restart";

const AUTO_APPROVED_COMMENT: &str = "approved automatically: checks passed";
const ISSUE_CANCELED_COMMENT: &str = "issue canceled";

/// Request payload for creating an issue with its pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIssueRequest {
    name: String,
    creator: ActorId,
    assignee: Option<ActorId>,
    stages: Vec<NewStage>,
}

impl CreateIssueRequest {
    /// Creates a request with no stages.
    #[must_use]
    pub fn new(name: impl Into<String>, creator: ActorId) -> Self {
        Self {
            name: name.into(),
            creator,
            assignee: None,
            stages: Vec::new(),
        }
    }

    /// Sets the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: ActorId) -> Self {
        self.assignee = Some(assignee);
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: NewStage) -> Self {
        self.stages.push(stage);
        self
    }
}

/// Drives issues, pipelines and tasks through their state machines.
///
/// Tasks reach `RUNNING` only through [`Self::mark_running`], which needs an
/// instance slot, and leave it only through [`Self::complete_task`] and
/// [`Self::fail_task`].
pub struct PipelineStatusService<R, A, C>
where
    R: PipelineRepository,
    A: ActivityRecorder,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    activity: Arc<A>,
    clock: Arc<C>,
    run_threshold: TaskCheckStatus,
    auto_approve_threshold: TaskCheckStatus,
}

impl<R, A, C> Clone for PipelineStatusService<R, A, C>
where
    R: PipelineRepository,
    A: ActivityRecorder,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            activity: Arc::clone(&self.activity),
            clock: Arc::clone(&self.clock),
            run_threshold: self.run_threshold,
            auto_approve_threshold: self.auto_approve_threshold,
        }
    }
}

impl<R, A, C> PipelineStatusService<R, A, C>
where
    R: PipelineRepository,
    A: ActivityRecorder,
    C: Clock + Send + Sync,
{
    /// Creates a service that lets warnings through to `RUNNING` and
    /// auto-approves only clean checks.
    #[must_use]
    pub const fn new(repository: Arc<R>, activity: Arc<A>, clock: Arc<C>) -> Self {
        Self {
            repository,
            activity,
            clock,
            run_threshold: TaskCheckStatus::Warn,
            auto_approve_threshold: TaskCheckStatus::Success,
        }
    }

    /// Sets the severity thresholds for running and for automatic approval.
    #[must_use]
    pub fn with_thresholds(
        mut self,
        run_threshold: TaskCheckStatus,
        auto_approve_threshold: TaskCheckStatus,
    ) -> Self {
        self.run_threshold = run_threshold;
        self.auto_approve_threshold = auto_approve_threshold;
        self
    }

    /// Returns the repository.
    #[must_use]
    pub const fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Creates an issue and its pipeline, then requests the checks of the
    /// first stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Domain`] for an invalid pipeline and
    /// [`PipelineServiceError::Repository`] when persistence fails.
    pub async fn create_issue(&self, request: CreateIssueRequest) -> PipelineServiceResult<Issue> {
        let pipeline = Pipeline::new(request.name.clone(), request.stages, &*self.clock)?;
        let mut issue = Issue::new(pipeline.id(), request.name, request.creator, &*self.clock)?;
        if let Some(assignee) = request.assignee {
            issue = issue.with_assignee(assignee);
        }

        self.repository.create_issue(&issue, &pipeline).await?;
        info!(
            issue_id = %issue.id(),
            pipeline_id = %pipeline.id(),
            stages = pipeline.stages().len(),
            tasks = pipeline.tasks().count(),
            "created issue"
        );
        self.advance_pipeline(pipeline.id()).await?;
        Ok(issue)
    }

    /// Approves an issue so its tasks may run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::IssuePermissionDenied`] unless the
    /// actor is privileged or the assignee, and a domain error for a closed
    /// issue.
    pub async fn approve_issue(
        &self,
        issue_id: IssueId,
        actor: Actor,
    ) -> PipelineServiceResult<Issue> {
        let mut issue = self.load_issue(issue_id).await?;
        if !(actor.is_privileged() || issue.assignee() == Some(actor.id)) {
            return Err(PipelineServiceError::IssuePermissionDenied {
                actor: actor.id,
                issue_id,
            });
        }
        issue.approve(&*self.clock)?;
        self.repository.update_issue(&issue).await?;
        info!(issue_id = %issue_id, actor = %actor.id, "approved issue");
        Ok(issue)
    }

    /// Cancels an issue and every task that has not started.
    ///
    /// Tasks already running finish normally.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::IssuePermissionDenied`] unless the
    /// actor is privileged or the creator, and a domain error for a closed
    /// issue.
    pub async fn cancel_issue(
        &self,
        issue_id: IssueId,
        actor: Actor,
    ) -> PipelineServiceResult<Issue> {
        let mut issue = self.load_issue(issue_id).await?;
        if !(actor.is_privileged() || issue.creator() == actor.id) {
            return Err(PipelineServiceError::IssuePermissionDenied {
                actor: actor.id,
                issue_id,
            });
        }
        issue.cancel(&*self.clock)?;

        let pipeline = self.load_pipeline(issue.pipeline_id()).await?;
        let cancelable: Vec<Task> = pipeline
            .tasks()
            .filter(|task| {
                matches!(
                    task.status(),
                    TaskStatus::PendingApproval | TaskStatus::Pending
                )
            })
            .cloned()
            .collect();
        for mut task in cancelable {
            let from = task.status();
            task.transition_to(
                TaskStatus::Canceled,
                actor.id,
                Some(ISSUE_CANCELED_COMMENT.to_owned()),
                &*self.clock,
            )?;
            match self.persist(&task, from, Some(issue_id)).await {
                Ok(()) => {}
                Err(PipelineServiceError::Repository(PipelineRepositoryError::StatusConflict {
                    actual,
                    ..
                })) => {
                    debug!(task_id = %task.id(), status = actual.as_str(), "task moved on before cancellation");
                }
                Err(err) => return Err(err),
            }
        }

        self.repository.update_issue(&issue).await?;
        info!(issue_id = %issue_id, actor = %actor.id, "canceled issue");
        self.advance_pipeline(issue.pipeline_id()).await?;
        Ok(issue)
    }

    /// Re-derives the pipeline status and prepares the active stage.
    ///
    /// Settled pipelines are persisted as `DONE` or `CANCELED` and their
    /// issue is marked done. For an open pipeline, missing check runs of the
    /// active stage are requested, and under an automatic approval policy
    /// tasks whose checks pass the approval threshold move to `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Repository`] when persistence fails.
    pub async fn advance_pipeline(
        &self,
        pipeline_id: PipelineId,
    ) -> PipelineServiceResult<PipelineStatus> {
        let pipeline = self.load_pipeline(pipeline_id).await?;
        let derived = pipeline.derived_status();
        if derived != pipeline.status() {
            self.repository
                .update_pipeline_status(pipeline_id, derived, self.clock.utc())
                .await?;
            info!(pipeline_id = %pipeline_id, status = derived.as_str(), "pipeline status changed");
        }

        if derived != PipelineStatus::Open {
            self.settle_issue(pipeline_id).await?;
            return Ok(derived);
        }

        let Some(stage) = pipeline.active_stage() else {
            return Ok(derived);
        };
        let issue_id = self
            .repository
            .find_issue_by_pipeline(pipeline_id)
            .await?
            .map(|issue| issue.id());
        let automatic = stage.approval_policy() == ApprovalPolicy::Automatic;

        for task in stage.tasks() {
            if !matches!(
                task.status(),
                TaskStatus::PendingApproval | TaskStatus::Pending
            ) {
                continue;
            }
            let runs = self.ensure_check_runs(task).await?;
            if !automatic || task.status() != TaskStatus::PendingApproval {
                continue;
            }
            let verdict = evaluate_checks(&planned_checks(task), &runs, self.auto_approve_threshold);
            if !verdict.is_passed() {
                continue;
            }

            let mut approved = task.clone();
            approved.transition_to(
                TaskStatus::Pending,
                ActorId::SYSTEM,
                Some(AUTO_APPROVED_COMMENT.to_owned()),
                &*self.clock,
            )?;
            match self.persist(&approved, TaskStatus::PendingApproval, issue_id).await {
                Ok(()) => info!(task_id = %task.id(), "approved task automatically"),
                Err(PipelineServiceError::Repository(
                    PipelineRepositoryError::StatusConflict { .. },
                )) => debug!(task_id = %task.id(), "task changed before automatic approval"),
                Err(err) => return Err(err),
            }
        }
        Ok(derived)
    }

    /// Moves a task to `status` on behalf of `actor`.
    ///
    /// Retrying a failed task of a finished issue reopens the issue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::ReservedStatus`] for `RUNNING`, and
    /// for `DONE` or `FAILED` requested by anyone but the system;
    /// [`PipelineServiceError::PermissionDenied`] when the actor may not make
    /// the change; [`PipelineServiceError::SkipReasonRequired`] for a skip
    /// without a comment; and a domain error for a transition the state
    /// machine does not permit. Nothing is mutated on error.
    pub async fn patch_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        actor: Actor,
        comment: Option<String>,
    ) -> PipelineServiceResult<Task> {
        if status == TaskStatus::Running {
            return Err(PipelineServiceError::ReservedStatus(status));
        }
        let mut task = self.load_task(task_id).await?;
        let mut issue = self.load_issue_for(task.pipeline_id()).await?;
        if !actor_may_change_status(actor, &issue, status) {
            return Err(if matches!(status, TaskStatus::Done | TaskStatus::Failed) {
                PipelineServiceError::ReservedStatus(status)
            } else {
                PipelineServiceError::PermissionDenied {
                    actor: actor.id,
                    task_id,
                    status,
                }
            });
        }
        if status == TaskStatus::Skipped
            && comment
                .as_deref()
                .is_none_or(|reason| reason.trim().is_empty())
        {
            return Err(PipelineServiceError::SkipReasonRequired(task_id));
        }

        let from = task.status();
        task.transition_to(status, actor.id, comment, &*self.clock)?;
        let reopened = from == TaskStatus::Failed
            && status == TaskStatus::Pending
            && issue.status() == IssueStatus::Done;
        if reopened {
            issue.reopen(&*self.clock)?;
        }

        self.persist(&task, from, Some(issue.id())).await?;
        if reopened {
            self.repository.update_issue(&issue).await?;
            info!(issue_id = %issue.id(), task_id = %task_id, "reopened issue for retry");
        }
        info!(
            task_id = %task_id,
            actor = %actor.id,
            from = from.as_str(),
            to = status.as_str(),
            "task status changed"
        );

        if status.is_terminal() || from.is_terminal() {
            self.advance_pipeline(task.pipeline_id()).await?;
        }
        Ok(task)
    }

    /// Returns `true` when `actor` may move `task` to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError`] when the issue cannot be loaded.
    pub async fn can_actor_change_task_status(
        &self,
        actor: Actor,
        task: &Task,
        status: TaskStatus,
    ) -> PipelineServiceResult<bool> {
        let issue = self.load_issue_for(task.pipeline_id()).await?;
        Ok(actor_may_change_status(actor, &issue, status))
    }

    /// Requests a fresh run of every planned check of a waiting task. The
    /// new runs supersede earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::ChecksClosed`] for running or
    /// terminal tasks and [`PipelineServiceError::IssuePermissionDenied`]
    /// for actors outside the issue.
    pub async fn rerun_checks(
        &self,
        task_id: TaskId,
        actor: Actor,
    ) -> PipelineServiceResult<Vec<TaskCheckRun>> {
        let task = self.load_task(task_id).await?;
        let issue = self.load_issue_for(task.pipeline_id()).await?;
        let involved = actor.is_privileged()
            || issue.creator() == actor.id
            || issue.assignee() == Some(actor.id);
        if !involved {
            return Err(PipelineServiceError::IssuePermissionDenied {
                actor: actor.id,
                issue_id: issue.id(),
            });
        }
        if !matches!(
            task.status(),
            TaskStatus::PendingApproval | TaskStatus::Pending
        ) {
            return Err(PipelineServiceError::ChecksClosed {
                task_id,
                status: task.status(),
            });
        }

        let runs: Vec<TaskCheckRun> = planned_checks(&task)
            .into_iter()
            .map(|check_type| TaskCheckRun::request(task_id, check_type, &*self.clock))
            .collect();
        self.repository.create_task_check_runs(&runs).await?;
        info!(task_id = %task_id, runs = runs.len(), "requested check re-run");
        Ok(runs)
    }

    /// Evaluates the task's latest check runs against the run threshold.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Repository`] when lookups fail.
    pub async fn check_verdict(&self, task: &Task) -> PipelineServiceResult<CheckVerdict> {
        let runs = self
            .repository
            .list_task_check_runs(&TaskCheckRunFind::for_task(task.id()))
            .await?;
        Ok(evaluate_checks(&planned_checks(task), &runs, self.run_threshold))
    }

    /// Checks every guard that must hold before `task` may start, except
    /// the instance slot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Guard`] naming the first violated
    /// guard.
    pub async fn evaluate_run_guards(&self, task: &Task) -> PipelineServiceResult<()> {
        if task.status() != TaskStatus::Pending {
            return Err(GuardViolation::NotPending {
                task_id: task.id(),
                status: task.status(),
            }
            .into());
        }

        let pipeline = self.load_pipeline(task.pipeline_id()).await?;
        let active = pipeline.active_stage().map(|stage| stage.id());
        if active != Some(task.stage_id()) {
            return Err(GuardViolation::StageNotActive {
                task_id: task.id(),
                stage_id: task.stage_id(),
            }
            .into());
        }

        let issue = self.load_issue_for(task.pipeline_id()).await?;
        if !issue.is_approved() {
            return Err(GuardViolation::IssueNotApproved(issue.id()).into());
        }

        let now = self.clock.utc();
        if let Some(earliest) = task.earliest_allowed_at().filter(|_| !task.is_due(now)) {
            return Err(GuardViolation::NotDue {
                task_id: task.id(),
                earliest,
            }
            .into());
        }

        match self.check_verdict(task).await? {
            CheckVerdict::Passed => Ok(()),
            CheckVerdict::Waiting(check_types) => Err(GuardViolation::ChecksPending {
                task_id: task.id(),
                check_types,
            }
            .into()),
            CheckVerdict::Blocked(results) => Err(GuardViolation::ChecksBlocked {
                task_id: task.id(),
                titles: results
                    .into_iter()
                    .map(|result| format!("{}: {}", result.title, result.content))
                    .collect(),
            }
            .into()),
        }
    }

    /// Moves a pending task to `RUNNING` after re-checking its guards.
    ///
    /// `slot` proves an instance connection was admitted for the task.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Guard`] when a guard fails or the
    /// slot belongs to another instance, and
    /// [`PipelineRepositoryError::StatusConflict`] when another writer moved
    /// the task first.
    pub async fn mark_running(
        &self,
        task_id: TaskId,
        slot: &AdmissionToken<InstanceId>,
    ) -> PipelineServiceResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if *slot.key() != task.target().instance_id {
            return Err(GuardViolation::SlotMismatch(task_id).into());
        }
        self.evaluate_run_guards(&task).await?;

        let issue_id = self
            .repository
            .find_issue_by_pipeline(task.pipeline_id())
            .await?
            .map(|issue| issue.id());
        task.transition_to(TaskStatus::Running, ActorId::SYSTEM, None, &*self.clock)?;
        self.persist(&task, TaskStatus::Pending, issue_id).await?;
        Ok(task)
    }

    /// Records a successful run and advances the pipeline.
    ///
    /// A task that left `RUNNING` while its worker was busy, e.g. skipped
    /// by an operator, keeps its status and the outcome is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Repository`] when persistence fails.
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        result: TaskRunResult,
    ) -> PipelineServiceResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if task.status() != TaskStatus::Running {
            return Ok(outcome_dropped(task));
        }
        task.complete(result, &*self.clock)?;
        self.record_outcome(task).await
    }

    /// Records a failed run and advances the pipeline.
    ///
    /// A task that left `RUNNING` while its worker was busy keeps its
    /// status and the failure is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Repository`] when persistence fails.
    pub async fn fail_task(
        &self,
        task_id: TaskId,
        code: ErrorCode,
        comment: impl Into<String>,
    ) -> PipelineServiceResult<Task> {
        let mut task = self.load_task(task_id).await?;
        if task.status() != TaskStatus::Running {
            return Ok(outcome_dropped(task));
        }
        task.fail(code, comment, &*self.clock)?;
        self.record_outcome(task).await
    }

    async fn record_outcome(&self, task: Task) -> PipelineServiceResult<Task> {
        let task_id = task.id();
        match self.finish(task, TaskStatus::Running).await {
            Err(PipelineServiceError::Repository(PipelineRepositoryError::StatusConflict {
                ..
            })) => Ok(outcome_dropped(self.load_task(task_id).await?)),
            recorded => recorded,
        }
    }

    /// Fails every task a previous process left `RUNNING`, so an operator
    /// can retry it instead of the scheduler re-running it blindly.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineServiceError::Repository`] when persistence fails.
    pub async fn recover_interrupted_tasks(&self) -> PipelineServiceResult<usize> {
        let running = self.repository.list_tasks(TaskStatus::Running).await?;
        let mut recovered = 0;
        for mut task in running {
            task.fail(ErrorCode::Internal, INTERRUPTED_COMMENT, &*self.clock)?;
            match self.finish(task, TaskStatus::Running).await {
                Ok(failed) => {
                    warn!(task_id = %failed.id(), "failed task interrupted by restart");
                    recovered += 1;
                }
                Err(PipelineServiceError::Repository(
                    PipelineRepositoryError::StatusConflict { task_id, .. },
                )) => debug!(task_id = %task_id, "interrupted task already moved on"),
                Err(err) => return Err(err),
            }
        }
        Ok(recovered)
    }

    async fn finish(&self, task: Task, from: TaskStatus) -> PipelineServiceResult<Task> {
        let issue_id = self
            .repository
            .find_issue_by_pipeline(task.pipeline_id())
            .await?
            .map(|issue| issue.id());
        self.persist(&task, from, issue_id).await?;
        info!(
            task_id = %task.id(),
            status = task.status().as_str(),
            code = task.code().as_str(),
            "task finished"
        );
        self.advance_pipeline(task.pipeline_id()).await?;
        Ok(task)
    }

    async fn ensure_check_runs(&self, task: &Task) -> PipelineServiceResult<Vec<TaskCheckRun>> {
        let planned = planned_checks(task);
        if planned.is_empty() {
            return Ok(Vec::new());
        }

        let mut runs = self
            .repository
            .list_task_check_runs(&TaskCheckRunFind::for_task(task.id()))
            .await?;
        let missing: Vec<TaskCheckRun> = planned
            .into_iter()
            .filter(|check_type| !runs.iter().any(|run| run.check_type() == *check_type))
            .map(|check_type| TaskCheckRun::request(task.id(), check_type, &*self.clock))
            .collect();
        if !missing.is_empty() {
            self.repository.create_task_check_runs(&missing).await?;
            debug!(task_id = %task.id(), runs = missing.len(), "requested task checks");
            runs.extend(missing);
        }
        Ok(runs)
    }

    async fn settle_issue(&self, pipeline_id: PipelineId) -> PipelineServiceResult<()> {
        let Some(mut issue) = self.repository.find_issue_by_pipeline(pipeline_id).await? else {
            return Ok(());
        };
        if issue.status() != IssueStatus::Open {
            return Ok(());
        }
        issue.settle(&*self.clock);
        self.repository.update_issue(&issue).await?;
        info!(issue_id = %issue.id(), "issue done");
        Ok(())
    }

    async fn persist(
        &self,
        task: &Task,
        from: TaskStatus,
        issue_id: Option<IssueId>,
    ) -> PipelineServiceResult<()> {
        self.repository.compare_and_swap_task(task, from).await?;
        let activity = TaskStatusActivity {
            actor: task.updated_by(),
            issue_id,
            pipeline_id: task.pipeline_id(),
            task_id: task.id(),
            from,
            to: task.status(),
            comment: task.comment().map(str::to_owned),
            recorded_at: task.updated_at(),
        };
        if let Err(err) = self.activity.record(activity).await {
            warn!(task_id = %task.id(), error = %err, "failed to record task activity");
        }
        Ok(())
    }

    async fn load_task(&self, id: TaskId) -> PipelineServiceResult<Task> {
        self.repository
            .find_task(id)
            .await?
            .ok_or_else(|| PipelineRepositoryError::TaskNotFound(id).into())
    }

    async fn load_pipeline(&self, id: PipelineId) -> PipelineServiceResult<Pipeline> {
        self.repository
            .find_pipeline(id)
            .await?
            .ok_or_else(|| PipelineRepositoryError::PipelineNotFound(id).into())
    }

    async fn load_issue(&self, id: IssueId) -> PipelineServiceResult<Issue> {
        self.repository
            .find_issue(id)
            .await?
            .ok_or_else(|| PipelineRepositoryError::IssueNotFound(id).into())
    }

    async fn load_issue_for(&self, pipeline_id: PipelineId) -> PipelineServiceResult<Issue> {
        self.repository
            .find_issue_by_pipeline(pipeline_id)
            .await?
            .ok_or(PipelineServiceError::MissingIssue(pipeline_id))
    }
}

fn planned_checks(task: &Task) -> Vec<TaskCheckType> {
    plan_checks(task.task_type(), task.target().engine.capabilities())
}

fn outcome_dropped(task: Task) -> Task {
    info!(
        task_id = %task.id(),
        status = task.status().as_str(),
        "task left RUNNING before its worker finished; outcome dropped"
    );
    task
}
