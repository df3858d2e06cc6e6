//! Port implemented by task executors.

use crate::error::ErrorCode;
use crate::ledger::domain::LedgerDomainError;
use crate::ledger::ports::DriverError;
use crate::pipeline::domain::{ActorId, IssueId, Task, TaskRunResult, TaskType};
use crate::taskcheck::ports::CollaboratorError;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for task executors.
pub type TaskExecutorResult<T> = Result<T, TaskExecutorError>;

/// Issue-level facts an executor records alongside its change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRunContext {
    /// Issue driving the task.
    pub issue_id: Option<IssueId>,
    /// Issue creator, recorded as the ledger actor.
    pub creator: ActorId,
}

impl TaskRunContext {
    /// Context for a task without an issue, recorded as the system actor.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            issue_id: None,
            creator: ActorId::SYSTEM,
        }
    }
}

/// Performs the work of one task type against its target database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs `task` to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskExecutorError`] classifying why the task failed.
    async fn run(&self, task: &Task, context: &TaskRunContext) -> TaskExecutorResult<TaskRunResult>;
}

/// Failure of a task executor.
#[derive(Debug, Clone, Error)]
pub enum TaskExecutorError {
    /// The driver or the ledger failed or rejected the change.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Migration metadata derived from the task is invalid.
    #[error("invalid migration metadata: {0}")]
    Metadata(#[from] LedgerDomainError),

    /// An external tool failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The task carries no statement.
    #[error("empty {0} statement")]
    EmptyStatement(TaskType),

    /// The executor does not handle this task type.
    #[error("{0} tasks are not supported by this executor")]
    Unsupported(TaskType),
}

impl TaskExecutorError {
    /// Classifies the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Driver(err) => err.code(),
            Self::Metadata(_) | Self::EmptyStatement(_) => ErrorCode::Invalid,
            Self::Collaborator(_) => ErrorCode::Internal,
            Self::Unsupported(_) => ErrorCode::NotImplemented,
        }
    }
}
