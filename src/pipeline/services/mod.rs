//! Orchestration services for the pipeline state model.

mod error;
mod gate;
mod permissions;
mod status;

pub use error::{GuardViolation, PipelineServiceError, PipelineServiceResult};
pub use gate::{CheckVerdict, evaluate_checks};
pub use permissions::actor_may_change_status;
pub use status::{CreateIssueRequest, INTERRUPTED_COMMENT, PipelineStatusService};
