//! Stages: ordered phases of a pipeline.

use super::{NewTask, PipelineDomainError, PipelineId, StageId, Task};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// How tasks of a stage leave `PENDING_APPROVAL`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// An actor approves each task.
    #[default]
    Manual,
    /// The scheduler approves tasks whose checks pass cleanly.
    Automatic,
}

/// Parameters for creating a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStage {
    /// Display name.
    pub name: String,
    /// Environment the stage deploys to.
    pub environment: Option<String>,
    /// Approval policy.
    pub approval_policy: ApprovalPolicy,
    /// Tasks, in execution order.
    pub tasks: Vec<NewTask>,
}

impl NewStage {
    /// Creates a manually approved stage with no tasks.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
            approval_policy: ApprovalPolicy::Manual,
            tasks: Vec::new(),
        }
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the approval policy.
    #[must_use]
    pub fn with_approval_policy(mut self, approval_policy: ApprovalPolicy) -> Self {
        self.approval_policy = approval_policy;
        self
    }

    /// Appends a task.
    #[must_use]
    pub fn with_task(mut self, task: NewTask) -> Self {
        self.tasks.push(task);
        self
    }
}

/// Ordered phase of a pipeline owning its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    id: StageId,
    pipeline_id: PipelineId,
    name: String,
    environment: Option<String>,
    approval_policy: ApprovalPolicy,
    tasks: Vec<Task>,
}

impl Stage {
    /// Creates a stage and its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank stage name,
    /// [`PipelineDomainError::EmptyStage`] when there are no tasks, or any
    /// task construction error.
    pub fn new(
        pipeline_id: PipelineId,
        definition: NewStage,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        if definition.name.trim().is_empty() {
            return Err(PipelineDomainError::EmptyName("stage"));
        }
        if definition.tasks.is_empty() {
            return Err(PipelineDomainError::EmptyStage(definition.name));
        }

        let id = StageId::new();
        let tasks = definition
            .tasks
            .into_iter()
            .map(|task| Task::new(pipeline_id, id, task, clock))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id,
            pipeline_id,
            name: definition.name,
            environment: definition.environment,
            approval_policy: definition.approval_policy,
            tasks,
        })
    }

    /// Returns the stage identifier.
    #[must_use]
    pub const fn id(&self) -> StageId {
        self.id
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the environment, if any.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Returns the approval policy.
    #[must_use]
    pub const fn approval_policy(&self) -> ApprovalPolicy {
        self.approval_policy
    }

    /// Returns the tasks in execution order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns a mutable handle to the tasks, for repositories.
    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    /// Returns `true` when every task is terminal.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|task| task.status().is_terminal())
    }
}
