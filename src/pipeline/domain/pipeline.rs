//! Pipeline aggregate.

use super::{NewStage, PipelineDomainError, PipelineId, Stage, StageId, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Pipeline status, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    /// At least one task is not terminal.
    Open,
    /// Every task is terminal and at least one was not canceled.
    Done,
    /// Every task was canceled.
    Canceled,
}

impl PipelineStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Done => "DONE",
            Self::Canceled => "CANCELED",
        }
    }
}

/// Named container of ordered stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    id: PipelineId,
    name: String,
    status: PipelineStatus,
    stages: Vec<Stage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Creates an open pipeline with its stages and tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name,
    /// [`PipelineDomainError::EmptyPipeline`] when there are no stages, or
    /// any stage construction error.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<NewStage>,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        let pipeline_name = name.into();
        if pipeline_name.trim().is_empty() {
            return Err(PipelineDomainError::EmptyName("pipeline"));
        }
        if stages.is_empty() {
            return Err(PipelineDomainError::EmptyPipeline);
        }

        let id = PipelineId::new();
        let built = stages
            .into_iter()
            .map(|stage| Stage::new(id, stage, clock))
            .collect::<Result<Vec<_>, _>>()?;
        let timestamp = clock.utc();
        Ok(Self {
            id,
            name: pipeline_name,
            status: PipelineStatus::Open,
            stages: built,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Returns the pipeline identifier.
    #[must_use]
    pub const fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the last persisted status.
    #[must_use]
    pub const fn status(&self) -> PipelineStatus {
        self.status
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns a mutable handle to the stages, for repositories.
    pub fn stages_mut(&mut self) -> &mut [Stage] {
        &mut self.stages
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last status change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Iterates over every task in stage order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flat_map(Stage::tasks)
    }

    /// Finds a task by identifier.
    #[must_use]
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks().find(|task| task.id() == task_id)
    }

    /// Finds the stage that owns `stage_id`.
    #[must_use]
    pub fn stage(&self, stage_id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id() == stage_id)
    }

    /// Returns the earliest stage with a non-terminal task.
    #[must_use]
    pub fn active_stage(&self) -> Option<&Stage> {
        self.stages.iter().find(|stage| !stage.is_settled())
    }

    /// Derives the status from the tasks.
    ///
    /// A failed task keeps the pipeline open until it is retried or skipped.
    #[must_use]
    pub fn derived_status(&self) -> PipelineStatus {
        if self
            .tasks()
            .any(|task| !task.status().is_terminal() || task.status() == TaskStatus::Failed)
        {
            PipelineStatus::Open
        } else if self.tasks().all(|task| task.status() == TaskStatus::Canceled) {
            PipelineStatus::Canceled
        } else {
            PipelineStatus::Done
        }
    }

    /// Records a new status.
    pub const fn set_status(&mut self, status: PipelineStatus, updated_at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = updated_at;
    }
}
