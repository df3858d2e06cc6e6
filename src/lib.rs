//! Gropius: database migration orchestration.
//!
//! Change requests become issues that drive a pipeline of stages of tasks.
//! Tasks are gated by pre-flight checks, dispatched under per-instance
//! admission control, and applied through a migration ledger that records
//! each change exactly once and in version order.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure types and state machines with no infrastructure
//!   dependencies
//! - **Ports**: Async trait interfaces at the infrastructure seams
//! - **Adapters**: In-memory and `PostgreSQL` implementations of ports
//! - **Services**: Orchestration over ports
//!
//! # Modules
//!
//! - [`ledger`]: Migration ledger, driver contract and history records
//! - [`pipeline`]: Issue, pipeline, stage, task and check run state
//! - [`taskcheck`]: Check plans, check executors and the check scheduler
//! - [`taskrun`]: Task executors and the task scheduler
//! - [`admission`], [`registry`], [`supervisor`]: Shared scheduling
//!   building blocks
//! - [`orchestrator`]: Both schedulers wired from [`config::SchedulerConfig`]
//! - [`config`], [`telemetry`]: Configuration loading and logging setup

pub mod admission;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod supervisor;
pub mod taskcheck;
pub mod taskrun;
pub mod telemetry;
