//! Errors raised by pipeline services.

use crate::error::ErrorCode;
use crate::pipeline::{
    domain::{
        ActorId, IssueId, PipelineDomainError, PipelineId, StageId, TaskCheckType, TaskId,
        TaskStatus,
    },
    ports::PipelineRepositoryError,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A run guard that refused to let a task start.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardViolation {
    /// The task is not waiting to run.
    #[error("task {task_id} is {} and cannot start", status.as_str())]
    NotPending {
        /// Task that was asked to start.
        task_id: TaskId,
        /// Its current status.
        status: TaskStatus,
    },

    /// An earlier stage still has unfinished tasks.
    #[error("stage {stage_id} of task {task_id} is not the active stage")]
    StageNotActive {
        /// Task that was asked to start.
        task_id: TaskId,
        /// Stage owning the task.
        stage_id: StageId,
    },

    /// The issue has not been approved.
    #[error("issue {0} is not approved")]
    IssueNotApproved(IssueId),

    /// Checks have not finished yet.
    #[error("task {task_id} is waiting for checks: {}", join_checks(check_types))]
    ChecksPending {
        /// Task that was asked to start.
        task_id: TaskId,
        /// Checks without a finished run.
        check_types: Vec<TaskCheckType>,
    },

    /// A check reported a result above the threshold.
    #[error("task {task_id} is blocked by checks: {}", titles.join("; "))]
    ChecksBlocked {
        /// Task that was asked to start.
        task_id: TaskId,
        /// Titles of the blocking results.
        titles: Vec<String>,
    },

    /// The task may not start yet.
    #[error("task {task_id} may not start before {earliest}")]
    NotDue {
        /// Task that was asked to start.
        task_id: TaskId,
        /// Earliest allowed start.
        earliest: DateTime<Utc>,
    },

    /// The admission token was issued for another instance.
    #[error("instance slot does not belong to the instance of task {0}")]
    SlotMismatch(TaskId),
}

fn join_checks(check_types: &[TaskCheckType]) -> String {
    check_types
        .iter()
        .map(|check_type| check_type.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Service-level errors for pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum PipelineServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] PipelineDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] PipelineRepositoryError),

    /// A run guard refused the transition.
    #[error(transparent)]
    Guard(#[from] GuardViolation),

    /// The actor may not make this change.
    #[error("actor {actor} may not move task {task_id} to {}", status.as_str())]
    PermissionDenied {
        /// Requesting actor.
        actor: ActorId,
        /// Task being changed.
        task_id: TaskId,
        /// Requested status.
        status: TaskStatus,
    },

    /// The actor may not act on the issue.
    #[error("actor {actor} may not change issue {issue_id}")]
    IssuePermissionDenied {
        /// Requesting actor.
        actor: ActorId,
        /// Issue being changed.
        issue_id: IssueId,
    },

    /// A pipeline has no issue driving it.
    #[error("pipeline {0} has no issue")]
    MissingIssue(PipelineId),

    /// Checks of a finished or running task cannot be re-run.
    #[error("checks of task {task_id} cannot be re-run while it is {}", status.as_str())]
    ChecksClosed {
        /// Task whose checks were requested.
        task_id: TaskId,
        /// Its current status.
        status: TaskStatus,
    },

    /// Only the scheduler may move tasks into this status.
    #[error("status {} is reserved for the scheduler", .0.as_str())]
    ReservedStatus(TaskStatus),

    /// Skipping needs a reason.
    #[error("skipping task {0} requires a reason")]
    SkipReasonRequired(TaskId),
}

impl PipelineServiceError {
    /// Classifies the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Repository(PipelineRepositoryError::Persistence(_)) | Self::MissingIssue(_) => {
                ErrorCode::Internal
            }
            Self::Domain(_)
            | Self::Repository(_)
            | Self::Guard(_)
            | Self::PermissionDenied { .. }
            | Self::IssuePermissionDenied { .. }
            | Self::ChecksClosed { .. }
            | Self::ReservedStatus(_)
            | Self::SkipReasonRequired(_) => ErrorCode::Invalid,
        }
    }
}

/// Result type for pipeline service operations.
pub type PipelineServiceResult<T> = Result<T, PipelineServiceError>;
