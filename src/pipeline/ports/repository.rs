//! Repository port for pipeline, issue and check run persistence.

use crate::pipeline::domain::{
    Issue, IssueId, Pipeline, PipelineId, PipelineStatus, Task, TaskCheckRun, TaskCheckRunId,
    TaskCheckRunStatus, TaskCheckType, TaskId, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for pipeline repository operations.
pub type PipelineRepositoryResult<T> = Result<T, PipelineRepositoryError>;

/// Filter for check run lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCheckRunFind {
    /// Restrict to one task.
    pub task_id: Option<TaskId>,
    /// Restrict to one status.
    pub status: Option<TaskCheckRunStatus>,
    /// Restrict to one check type.
    pub check_type: Option<TaskCheckType>,
}

impl TaskCheckRunFind {
    /// Finds every run of `task_id`.
    #[must_use]
    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    /// Finds every run in `status`.
    #[must_use]
    pub fn with_status(status: TaskCheckRunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns `true` when `run` satisfies the filter.
    #[must_use]
    pub fn matches(&self, run: &TaskCheckRun) -> bool {
        self.task_id.is_none_or(|id| id == run.task_id())
            && self.status.is_none_or(|status| status == run.status())
            && self
                .check_type
                .is_none_or(|check_type| check_type == run.check_type())
    }
}

/// Persistence contract for the pipeline state model.
///
/// Status writes are compare-and-set: a write naming an expected status
/// fails with [`PipelineRepositoryError::StatusConflict`] when another writer
/// got there first.
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Stores a new issue together with its pipeline, stages and tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::DuplicatePipeline`] when the
    /// pipeline already exists.
    async fn create_issue(
        &self,
        issue: &Issue,
        pipeline: &Pipeline,
    ) -> PipelineRepositoryResult<()>;

    /// Finds an issue by identifier.
    async fn find_issue(&self, id: IssueId) -> PipelineRepositoryResult<Option<Issue>>;

    /// Finds the issue driving a pipeline.
    async fn find_issue_by_pipeline(
        &self,
        pipeline_id: PipelineId,
    ) -> PipelineRepositoryResult<Option<Issue>>;

    /// Persists issue changes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::IssueNotFound`] when the issue does
    /// not exist.
    async fn update_issue(&self, issue: &Issue) -> PipelineRepositoryResult<()>;

    /// Finds a pipeline with its stages and tasks.
    async fn find_pipeline(&self, id: PipelineId) -> PipelineRepositoryResult<Option<Pipeline>>;

    /// Lists pipelines in `status`.
    async fn list_pipelines(
        &self,
        status: PipelineStatus,
    ) -> PipelineRepositoryResult<Vec<Pipeline>>;

    /// Persists a pipeline status.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::PipelineNotFound`] when the
    /// pipeline does not exist.
    async fn update_pipeline_status(
        &self,
        id: PipelineId,
        status: PipelineStatus,
        updated_at: DateTime<Utc>,
    ) -> PipelineRepositoryResult<()>;

    /// Finds a task by identifier.
    async fn find_task(&self, id: TaskId) -> PipelineRepositoryResult<Option<Task>>;

    /// Lists tasks in `status`, oldest first.
    async fn list_tasks(&self, status: TaskStatus) -> PipelineRepositoryResult<Vec<Task>>;

    /// Replaces a task if its stored status still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::TaskNotFound`] or
    /// [`PipelineRepositoryError::StatusConflict`].
    async fn compare_and_swap_task(
        &self,
        task: &Task,
        expected: TaskStatus,
    ) -> PipelineRepositoryResult<()>;

    /// Stores newly requested check runs.
    async fn create_task_check_runs(&self, runs: &[TaskCheckRun]) -> PipelineRepositoryResult<()>;

    /// Finds a check run by identifier.
    async fn find_task_check_run(
        &self,
        id: TaskCheckRunId,
    ) -> PipelineRepositoryResult<Option<TaskCheckRun>>;

    /// Lists check runs matching `find`, oldest first.
    async fn list_task_check_runs(
        &self,
        find: &TaskCheckRunFind,
    ) -> PipelineRepositoryResult<Vec<TaskCheckRun>>;

    /// Replaces a check run if it is still `RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineRepositoryError::TaskCheckRunNotFound`] or
    /// [`PipelineRepositoryError::CheckRunSettled`].
    async fn finish_task_check_run(&self, run: &TaskCheckRun) -> PipelineRepositoryResult<()>;
}

/// Errors returned by pipeline repository implementations.
#[derive(Debug, Clone, Error)]
pub enum PipelineRepositoryError {
    /// A pipeline with the same identifier already exists.
    #[error("duplicate pipeline identifier: {0}")]
    DuplicatePipeline(PipelineId),

    /// The pipeline was not found.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    /// The issue was not found.
    #[error("issue not found: {0}")]
    IssueNotFound(IssueId),

    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The check run was not found.
    #[error("task check run not found: {0}")]
    TaskCheckRunNotFound(TaskCheckRunId),

    /// The task status changed since it was read.
    #[error("task {task_id} is {} but {} was expected", actual.as_str(), expected.as_str())]
    StatusConflict {
        /// Task being written.
        task_id: TaskId,
        /// Status the writer read.
        expected: TaskStatus,
        /// Status currently stored.
        actual: TaskStatus,
    },

    /// The check run already finished.
    #[error("task check run {0} has already finished")]
    CheckRunSettled(TaskCheckRunId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PipelineRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
