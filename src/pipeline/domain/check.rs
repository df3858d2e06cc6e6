//! Task check runs and their results.

use super::{ParsePipelineEnumError, TaskCheckRunId, TaskId};
use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation a check run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskCheckType {
    /// The target database accepts connections.
    DatabaseConnect,
    /// The migration history table exists.
    MigrationSchema,
    /// The statement passes SQL review.
    StatementAdvise,
    /// The statement kind matches the task type.
    StatementType,
    /// gh-ost can run the change.
    GhostSync,
    /// Estimated rows touched by a data change.
    AffectedRowsReport,
}

impl TaskCheckType {
    /// Every check type, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::DatabaseConnect,
        Self::MigrationSchema,
        Self::StatementAdvise,
        Self::StatementType,
        Self::GhostSync,
        Self::AffectedRowsReport,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseConnect => "database-connect",
            Self::MigrationSchema => "migration-schema",
            Self::StatementAdvise => "statement-advise",
            Self::StatementType => "statement-type",
            Self::GhostSync => "ghost-sync",
            Self::AffectedRowsReport => "affected-rows-report",
        }
    }
}

impl fmt::Display for TaskCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskCheckType {
    type Error = ParsePipelineEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|check_type| check_type.as_str() == normalized)
            .ok_or_else(|| ParsePipelineEnumError::CheckType(value.to_owned()))
    }
}

/// Lifecycle of a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCheckRunStatus {
    /// Requested and waiting for, or under, execution.
    Running,
    /// Finished; results are available.
    Done,
    /// The executor failed; the results describe why.
    Failed,
    /// Abandoned before completion.
    Canceled,
}

/// Severity of one check result. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCheckStatus {
    /// Nothing to report.
    Success,
    /// Worth a look; does not block by default.
    Warn,
    /// Blocks the task.
    Error,
}

/// Namespace of results produced by the orchestrator itself.
pub const CORE_RESULT_NAMESPACE: &str = "gropius.core";

/// Result code used for executor failures and recovered panics.
pub const EXECUTOR_FAILURE_CODE: i32 = 1;

/// One finding reported by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCheckResult {
    /// Severity.
    pub status: TaskCheckStatus,
    /// Rule namespace, e.g. the advisor that produced it.
    pub namespace: String,
    /// Rule-specific code; zero for plain success.
    pub code: i32,
    /// Short summary.
    pub title: String,
    /// Full message.
    pub content: String,
    /// Statement line the finding refers to.
    pub line: Option<u32>,
    /// Statement column the finding refers to.
    pub column: Option<u32>,
    /// Extra structured detail.
    pub details: Option<String>,
    /// Objects the statement changes.
    pub changed_resources: Vec<String>,
}

impl TaskCheckResult {
    /// Creates a result in the core namespace.
    #[must_use]
    pub fn new(
        status: TaskCheckStatus,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            status,
            namespace: CORE_RESULT_NAMESPACE.to_owned(),
            code: 0,
            title: title.into(),
            content: content.into(),
            line: None,
            column: None,
            details: None,
            changed_resources: Vec::new(),
        }
    }

    /// Creates a success result.
    #[must_use]
    pub fn success(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(TaskCheckStatus::Success, title, content)
    }

    /// Creates a warning result.
    #[must_use]
    pub fn warn(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(TaskCheckStatus::Warn, title, content)
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(TaskCheckStatus::Error, title, content)
    }

    /// Sets the rule namespace and code.
    #[must_use]
    pub fn with_rule(mut self, namespace: impl Into<String>, code: i32) -> Self {
        self.namespace = namespace.into();
        self.code = code;
        self
    }

    /// Sets the statement position.
    #[must_use]
    pub fn with_position(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    /// Sets extra detail.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Sets the changed resources.
    #[must_use]
    pub fn with_changed_resources(mut self, resources: impl IntoIterator<Item = String>) -> Self {
        self.changed_resources = resources.into_iter().collect();
        self
    }
}

/// One execution of a check against a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCheckRun {
    id: TaskCheckRunId,
    task_id: TaskId,
    check_type: TaskCheckType,
    status: TaskCheckRunStatus,
    code: ErrorCode,
    results: Vec<TaskCheckResult>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskCheckRun {
    /// Requests a new run; it starts in `RUNNING`.
    #[must_use]
    pub fn request(task_id: TaskId, check_type: TaskCheckType, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskCheckRunId::new(),
            task_id,
            check_type,
            status: TaskCheckRunStatus::Running,
            code: ErrorCode::Ok,
            results: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn id(&self) -> TaskCheckRunId {
        self.id
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the check type.
    #[must_use]
    pub const fn check_type(&self) -> TaskCheckType {
        self.check_type
    }

    /// Returns the run status.
    #[must_use]
    pub const fn status(&self) -> TaskCheckRunStatus {
        self.status
    }

    /// Returns the failure code, or [`ErrorCode::Ok`].
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the reported results.
    #[must_use]
    pub fn results(&self) -> &[TaskCheckResult] {
        &self.results
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the completion timestamp, or the creation time while running.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the most severe result status.
    #[must_use]
    pub fn highest_severity(&self) -> Option<TaskCheckStatus> {
        self.results.iter().map(|result| result.status).max()
    }

    /// Returns `true` when the run finished and no result is more severe
    /// than `threshold`.
    #[must_use]
    pub fn passes(&self, threshold: TaskCheckStatus) -> bool {
        self.status == TaskCheckRunStatus::Done
            && self
                .highest_severity()
                .is_none_or(|severity| severity <= threshold)
    }

    /// Returns a finished copy of this run with `results`.
    #[must_use]
    pub fn completed(&self, results: Vec<TaskCheckResult>, clock: &impl Clock) -> Self {
        Self {
            status: TaskCheckRunStatus::Done,
            code: ErrorCode::Ok,
            results,
            updated_at: clock.utc(),
            ..self.clone()
        }
    }

    /// Returns a failed copy of this run with a single error result.
    #[must_use]
    pub fn failed(&self, code: ErrorCode, message: impl Into<String>, clock: &impl Clock) -> Self {
        let result = TaskCheckResult::error(
            format!("{} check failed", self.check_type.as_str()),
            message,
        )
        .with_rule(CORE_RESULT_NAMESPACE, EXECUTOR_FAILURE_CODE);
        Self {
            status: TaskCheckRunStatus::Failed,
            code,
            results: vec![result],
            updated_at: clock.utc(),
            ..self.clone()
        }
    }
}
