//! Pre-flight checks: which checks a task needs, the executors that run
//! them, and the scheduler that dispatches pending runs.

pub mod executors;
mod plan;
pub mod ports;
pub mod registry;
pub mod scheduler;

pub use plan::plan_checks;
pub use registry::{CheckCollaborators, TaskCheckExecutorRegistry, builtin_check_registry};
pub use scheduler::{DEFAULT_CHECK_INTERVAL, TaskCheckScheduler};

#[cfg(test)]
mod tests;
