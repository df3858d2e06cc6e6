//! Pipelines, stages, tasks, issues and check runs.
//!
//! The domain module holds the entities and the task state machine, ports
//! describe persistence and the activity trail, and the status service
//! applies transitions with their permission and run guards.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
