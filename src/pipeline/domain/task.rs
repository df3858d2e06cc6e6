//! Task aggregate and the task status state machine.

use super::{
    ActorId, DatabaseId, InstanceId, ParsePipelineEnumError, PipelineDomainError, PipelineId,
    StageId, TaskId,
};
use crate::{
    engine::Engine,
    error::ErrorCode,
    ledger::{domain::MigrationType, ports::ConnectionTarget},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Creates a database and records its baseline.
    DatabaseCreate,
    /// Records the current schema as the baseline.
    SchemaBaseline,
    /// Applies a schema migration.
    SchemaUpdate,
    /// Applies a schema migration derived from a declarative schema.
    SchemaUpdateSdl,
    /// Applies a schema migration through gh-ost.
    SchemaUpdateGhost,
    /// Applies a data change.
    DataUpdate,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::DatabaseCreate,
        Self::SchemaBaseline,
        Self::SchemaUpdate,
        Self::SchemaUpdateSdl,
        Self::SchemaUpdateGhost,
        Self::DataUpdate,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseCreate => "database-create",
            Self::SchemaBaseline => "schema-baseline",
            Self::SchemaUpdate => "schema-update",
            Self::SchemaUpdateSdl => "schema-update-sdl",
            Self::SchemaUpdateGhost => "schema-update-ghost",
            Self::DataUpdate => "data-update",
        }
    }

    /// Returns `true` when tasks of this type must not run concurrently with
    /// another sequential task on the same database.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        !matches!(self, Self::DatabaseCreate)
    }

    /// Returns the ledger type recorded for tasks of this type.
    #[must_use]
    pub const fn migration_type(self) -> MigrationType {
        match self {
            Self::DatabaseCreate | Self::SchemaBaseline => MigrationType::Baseline,
            Self::SchemaUpdate | Self::SchemaUpdateSdl | Self::SchemaUpdateGhost => {
                MigrationType::Migrate
            }
            Self::DataUpdate => MigrationType::Data,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParsePipelineEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == normalized)
            .ok_or_else(|| ParsePipelineEnumError::TaskType(value.to_owned()))
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for approval.
    PendingApproval,
    /// Approved and waiting for the scheduler.
    Pending,
    /// Executing on a worker.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error; may be retried.
    Failed,
    /// Canceled before it started.
    Canceled,
    /// Skipped by an operator.
    Skipped,
}

impl TaskStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::PendingApproval,
        Self::Pending,
        Self::Running,
        Self::Done,
        Self::Failed,
        Self::Canceled,
        Self::Skipped,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Returns `true` for statuses that no longer hold their stage open.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Canceled | Self::Skipped
        )
    }

    /// Returns `true` when the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::PendingApproval,
                Self::Pending | Self::Canceled | Self::Skipped
            ) | (
                Self::Pending,
                Self::Running | Self::Canceled | Self::Skipped
            ) | (Self::Running, Self::Done | Self::Failed | Self::Skipped)
                | (Self::Failed, Self::Pending | Self::Skipped)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParsePipelineEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParsePipelineEnumError::TaskStatus(value.to_owned()))
    }
}

/// The database a task executes against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskTarget {
    /// Instance hosting the database.
    pub instance_id: InstanceId,
    /// Database identity, absent until the database exists.
    pub database_id: Option<DatabaseId>,
    /// Instance engine.
    pub engine: Engine,
    /// Database name, also used as the ledger namespace.
    pub database_name: String,
    /// Environment of the database, if known.
    pub environment: Option<String>,
}

impl TaskTarget {
    /// Creates a target for an existing database.
    #[must_use]
    pub fn new(
        instance_id: InstanceId,
        database_id: DatabaseId,
        engine: Engine,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            database_id: Some(database_id),
            engine,
            database_name: database_name.into(),
            environment: None,
        }
    }

    /// Creates a target for a database that does not exist yet.
    #[must_use]
    pub fn new_database(
        instance_id: InstanceId,
        engine: Engine,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            database_id: None,
            engine,
            database_name: database_name.into(),
            environment: None,
        }
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Returns the driver target for the database.
    #[must_use]
    pub fn connection_target(&self) -> ConnectionTarget {
        ConnectionTarget::database(
            self.instance_id.to_string(),
            self.engine,
            self.database_name.clone(),
        )
    }

    /// Returns the driver target for the instance itself.
    #[must_use]
    pub fn instance_connection_target(&self) -> ConnectionTarget {
        ConnectionTarget::instance(self.instance_id.to_string(), self.engine)
    }
}

/// Payload of a database creation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCreatePayload {
    /// `CREATE DATABASE` statement run against the instance.
    pub statement: String,
    /// Version recorded for the baseline, if supplied.
    pub schema_version: Option<String>,
}

/// Payload of a migration task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPayload {
    /// Statement to apply.
    pub statement: String,
    /// Version recorded in the ledger; generated from the clock when absent.
    pub schema_version: Option<String>,
    /// Sheet the statement was loaded from, if any.
    pub sheet_id: Option<String>,
}

impl MigrationPayload {
    /// Creates a payload with a statement and explicit version.
    #[must_use]
    pub fn new(statement: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            schema_version: Some(schema_version.into()),
            sheet_id: None,
        }
    }
}

/// Type-specific task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Database creation.
    DatabaseCreate(DatabaseCreatePayload),
    /// Baseline, schema, SDL, ghost, or data migration.
    Migration(MigrationPayload),
}

impl TaskPayload {
    /// Returns the statement the task applies.
    #[must_use]
    pub fn statement(&self) -> &str {
        match self {
            Self::DatabaseCreate(payload) => &payload.statement,
            Self::Migration(payload) => &payload.statement,
        }
    }

    /// Returns the explicit schema version, if any.
    #[must_use]
    pub fn schema_version(&self) -> Option<&str> {
        match self {
            Self::DatabaseCreate(payload) => payload.schema_version.as_deref(),
            Self::Migration(payload) => payload.schema_version.as_deref(),
        }
    }

    const fn fits(&self, task_type: TaskType) -> bool {
        matches!(
            (self, task_type),
            (Self::DatabaseCreate(_), TaskType::DatabaseCreate)
                | (
                    Self::Migration(_),
                    TaskType::SchemaBaseline
                        | TaskType::SchemaUpdate
                        | TaskType::SchemaUpdateSdl
                        | TaskType::SchemaUpdateGhost
                        | TaskType::DataUpdate
                )
        )
    }
}

/// Outcome recorded when a task finishes successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunResult {
    /// Human readable summary.
    pub detail: String,
    /// Ledger row written by the task, if any.
    pub migration_id: Option<i64>,
    /// Version recorded by the task, if any.
    pub version: Option<String>,
}

/// Parameters for creating a task inside a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Display name.
    pub name: String,
    /// Task type.
    pub task_type: TaskType,
    /// Target database.
    pub target: TaskTarget,
    /// Type-specific payload.
    pub payload: TaskPayload,
    /// Earliest time the scheduler may start the task.
    pub earliest_allowed_at: Option<DateTime<Utc>>,
}

/// Task aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    pipeline_id: PipelineId,
    stage_id: StageId,
    name: String,
    task_type: TaskType,
    status: TaskStatus,
    target: TaskTarget,
    payload: TaskPayload,
    earliest_allowed_at: Option<DateTime<Utc>>,
    code: ErrorCode,
    comment: Option<String>,
    result: Option<TaskRunResult>,
    updated_by: ActorId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task in `PENDING_APPROVAL`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name and
    /// [`PipelineDomainError::PayloadMismatch`] when the payload does not fit
    /// the task type.
    pub fn new(
        pipeline_id: PipelineId,
        stage_id: StageId,
        definition: NewTask,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        if definition.name.trim().is_empty() {
            return Err(PipelineDomainError::EmptyName("task"));
        }
        if !definition.payload.fits(definition.task_type) {
            return Err(PipelineDomainError::PayloadMismatch(definition.task_type));
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            pipeline_id,
            stage_id,
            name: definition.name,
            task_type: definition.task_type,
            status: TaskStatus::PendingApproval,
            target: definition.target,
            payload: definition.payload,
            earliest_allowed_at: definition.earliest_allowed_at,
            code: ErrorCode::Ok,
            comment: None,
            result: None,
            updated_by: ActorId::SYSTEM,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning pipeline.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the owning stage.
    #[must_use]
    pub const fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the target database.
    #[must_use]
    pub const fn target(&self) -> &TaskTarget {
        &self.target
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Returns the earliest time the task may start.
    #[must_use]
    pub const fn earliest_allowed_at(&self) -> Option<DateTime<Utc>> {
        self.earliest_allowed_at
    }

    /// Returns the code of the last failure, or [`ErrorCode::Ok`].
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the comment attached by the last transition.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns the success result, if the task is done.
    #[must_use]
    pub const fn result(&self) -> Option<&TaskRunResult> {
        self.result.as_ref()
    }

    /// Returns the actor of the last transition.
    #[must_use]
    pub const fn updated_by(&self) -> ActorId {
        self.updated_by
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the timestamp of the last transition.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` when `now` is not before the earliest allowed time.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.earliest_allowed_at.is_none_or(|earliest| now >= earliest)
    }

    /// Moves the task to `target`, recording who did it and why.
    ///
    /// Retrying a failed task clears its failure code and result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStatusTransition`] when the
    /// state machine does not permit the move.
    pub fn transition_to(
        &mut self,
        target: TaskStatus,
        actor: ActorId,
        comment: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(PipelineDomainError::InvalidStatusTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }
        if target == TaskStatus::Pending {
            self.code = ErrorCode::Ok;
            self.result = None;
        }
        self.status = target;
        self.comment = comment;
        self.updated_by = actor;
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Marks a running task as done with its result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStatusTransition`] unless the
    /// task is running.
    pub fn complete(
        &mut self,
        result: TaskRunResult,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        let detail = result.detail.clone();
        self.transition_to(TaskStatus::Done, ActorId::SYSTEM, Some(detail), clock)?;
        self.result = Some(result);
        Ok(())
    }

    /// Marks a running task as failed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::InvalidStatusTransition`] unless the
    /// task is running.
    pub fn fail(
        &mut self,
        code: ErrorCode,
        comment: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), PipelineDomainError> {
        self.transition_to(
            TaskStatus::Failed,
            ActorId::SYSTEM,
            Some(comment.into()),
            clock,
        )?;
        self.code = code;
        Ok(())
    }
}
