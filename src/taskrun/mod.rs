//! Task execution: executors per task type and the scheduler that runs
//! due tasks under admission control.

pub mod executors;
pub mod ports;
pub mod registry;
pub mod scheduler;

pub use registry::{TaskExecutorRegistry, builtin_task_registry};
pub use scheduler::{DEFAULT_TASK_INTERVAL, TaskScheduler};

#[cfg(test)]
mod tests;
