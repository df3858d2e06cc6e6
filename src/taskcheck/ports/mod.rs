//! Port contracts for task checks and the external tools they consult.

pub mod collaborators;
pub mod executor;

pub use collaborators::{Advice, CollaboratorError, GhostRunner, RowEstimator, SqlAdvisor};
pub use executor::{CheckExecutorError, CheckExecutorResult, TaskCheckExecutor};

#[cfg(test)]
pub use collaborators::{MockGhostRunner, MockRowEstimator, MockSqlAdvisor};
#[cfg(test)]
pub use executor::MockTaskCheckExecutor;
