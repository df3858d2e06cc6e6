//! External tools consulted by checks and executors: the SQL advisor, the
//! gh-ost runner and the affected-rows estimator.

use crate::engine::Engine;
use crate::ledger::ports::ConnectionTarget;
use crate::pipeline::domain::TaskCheckStatus;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an external tool.
#[derive(Debug, Clone, Error)]
#[error("{tool}: {cause}")]
pub struct CollaboratorError {
    tool: &'static str,
    cause: Arc<dyn std::error::Error + Send + Sync>,
}

impl CollaboratorError {
    /// Wraps an error raised by `tool`.
    pub fn new(tool: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            tool,
            cause: Arc::new(err),
        }
    }

    /// Creates an error from a message.
    pub fn message(tool: &'static str, message: impl Into<String>) -> Self {
        Self::new(tool, std::io::Error::other(message.into()))
    }

    /// Returns the tool that failed.
    #[must_use]
    pub const fn tool(&self) -> &'static str {
        self.tool
    }
}

/// One finding of the SQL advisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    /// Severity.
    pub status: TaskCheckStatus,
    /// Rule code.
    pub code: i32,
    /// Rule title.
    pub title: String,
    /// Explanation.
    pub content: String,
    /// Statement line, if known.
    pub line: Option<u32>,
    /// Statement column, if known.
    pub column: Option<u32>,
}

/// SQL review rules.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlAdvisor: Send + Sync {
    /// Reviews `statement` for `engine`.
    async fn check(&self, engine: Engine, statement: &str) -> Result<Vec<Advice>, CollaboratorError>;
}

/// Online schema change through gh-ost.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GhostRunner: Send + Sync {
    /// Validates that gh-ost can apply `statement` to `target`.
    async fn dry_run(
        &self,
        target: &ConnectionTarget,
        statement: &str,
    ) -> Result<(), CollaboratorError>;

    /// Applies `statement` to `target` with gh-ost.
    async fn migrate(
        &self,
        target: &ConnectionTarget,
        statement: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Estimates the rows a data change touches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowEstimator: Send + Sync {
    /// Returns the estimated number of affected rows.
    async fn estimate(
        &self,
        target: &ConnectionTarget,
        statement: &str,
    ) -> Result<u64, CollaboratorError>;
}
