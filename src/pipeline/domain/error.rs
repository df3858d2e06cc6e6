//! Error types for the pipeline domain.

use super::{IssueId, TaskId, TaskStatus, TaskType};
use thiserror::Error;

/// Errors returned while constructing or mutating pipeline entities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineDomainError {
    /// A required name was blank.
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    /// A pipeline needs at least one stage.
    #[error("pipeline must contain at least one stage")]
    EmptyPipeline,

    /// A stage needs at least one task.
    #[error("stage '{0}' must contain at least one task")]
    EmptyStage(String),

    /// The payload kind does not fit the task type.
    #[error("payload does not match task type {}", .0.as_str())]
    PayloadMismatch(TaskType),

    /// The state machine does not permit the transition.
    #[error("invalid status transition for task {task_id}: {} -> {}", from.as_str(), to.as_str())]
    InvalidStatusTransition {
        /// Task being transitioned.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// The issue is no longer open.
    #[error("issue {0} is closed")]
    IssueClosed(IssueId),
}

/// Error returned while parsing pipeline enums from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParsePipelineEnumError {
    /// Unknown task type.
    #[error("unknown task type: {0}")]
    TaskType(String),
    /// Unknown task status.
    #[error("unknown task status: {0}")]
    TaskStatus(String),
    /// Unknown check type.
    #[error("unknown task check type: {0}")]
    CheckType(String),
}
