//! Port contracts for the pipeline state model.

pub mod activity;
pub mod repository;

pub use activity::{ActivityError, ActivityRecorder, TaskStatusActivity};
pub use repository::{
    PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult, TaskCheckRunFind,
};
