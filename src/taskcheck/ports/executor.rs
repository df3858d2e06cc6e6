//! Check executor port.

use crate::error::ErrorCode;
use crate::ledger::ports::DriverError;
use crate::pipeline::domain::{Task, TaskCheckResult, TaskCheckRun};
use async_trait::async_trait;
use thiserror::Error;

use super::CollaboratorError;

/// Result type for check executors.
pub type CheckExecutorResult<T> = Result<T, CheckExecutorError>;

/// Runs one kind of check against a task.
///
/// Findings, including failing ones, are returned as results. An error means
/// the check itself could not run, and fails the run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskCheckExecutor: Send + Sync {
    /// Runs the check for `run` against `task`.
    async fn run(&self, run: &TaskCheckRun, task: &Task)
    -> CheckExecutorResult<Vec<TaskCheckResult>>;
}

/// Failure that prevented a check from running.
#[derive(Debug, Clone, Error)]
pub enum CheckExecutorError {
    /// The target driver failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// An external tool failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The task carries no statement to check.
    #[error("task {0} has no statement to check")]
    MissingStatement(String),
}

impl CheckExecutorError {
    /// Classifies the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Driver(err) => err.code(),
            Self::Collaborator(_) => ErrorCode::Internal,
            Self::MissingStatement(_) => ErrorCode::Invalid,
        }
    }
}
