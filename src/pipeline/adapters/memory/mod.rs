//! In-memory adapters for the pipeline state model.

mod activity;
mod repository;

pub use activity::InMemoryActivityLog;
pub use repository::InMemoryPipelineRepository;
