//! Activity port: the audit trail of task status changes.

use crate::pipeline::domain::{ActorId, IssueId, PipelineId, TaskId, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// One recorded status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusActivity {
    /// Actor that made the change.
    pub actor: ActorId,
    /// Issue the task belongs to, when known.
    pub issue_id: Option<IssueId>,
    /// Pipeline the task belongs to.
    pub pipeline_id: PipelineId,
    /// Task that changed.
    pub task_id: TaskId,
    /// Previous status.
    pub from: TaskStatus,
    /// New status.
    pub to: TaskStatus,
    /// Reason or failure detail.
    pub comment: Option<String>,
    /// Time of the change.
    pub recorded_at: DateTime<Utc>,
}

/// Receives status change activities.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    /// Records one activity.
    async fn record(&self, activity: TaskStatusActivity) -> Result<(), ActivityError>;
}

/// Failure recording an activity.
#[derive(Debug, Clone, Error)]
#[error("failed to record activity: {0}")]
pub struct ActivityError(pub Arc<dyn std::error::Error + Send + Sync>);

impl ActivityError {
    /// Wraps a recorder failure.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
