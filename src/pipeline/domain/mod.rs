//! Domain model for pipelines, stages, tasks and check runs.
//!
//! A pipeline exclusively owns its stages, a stage its tasks. Check runs
//! reference their task and are kept after superseding re-runs.

mod check;
mod error;
mod ids;
mod issue;
mod pipeline;
mod stage;
mod task;

pub use check::{
    CORE_RESULT_NAMESPACE, EXECUTOR_FAILURE_CODE, TaskCheckResult, TaskCheckRun,
    TaskCheckRunStatus, TaskCheckStatus, TaskCheckType,
};
pub use error::{ParsePipelineEnumError, PipelineDomainError};
pub use ids::{
    ActorId, DatabaseId, InstanceId, IssueId, PipelineId, StageId, TaskCheckRunId, TaskId,
};
pub use issue::{Actor, ActorRole, ApprovalStatus, Issue, IssueStatus};
pub use pipeline::{Pipeline, PipelineStatus};
pub use stage::{ApprovalPolicy, NewStage, Stage};
pub use task::{
    DatabaseCreatePayload, MigrationPayload, NewTask, Task, TaskPayload, TaskRunResult,
    TaskStatus, TaskTarget, TaskType,
};
