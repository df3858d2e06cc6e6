//! Who may move a task into which status.

use crate::pipeline::domain::{Actor, ActorRole, Issue, TaskStatus};

/// Returns `true` when `actor` may move a task of `issue` to `status`.
///
/// Running, done and failed belong to the scheduler. Privileged roles may
/// make any other change; the issue creator may cancel, and the assignee
/// may approve, retry and skip.
#[must_use]
pub fn actor_may_change_status(actor: Actor, issue: &Issue, status: TaskStatus) -> bool {
    match status {
        TaskStatus::Running | TaskStatus::Done | TaskStatus::Failed => {
            actor.role == ActorRole::System
        }
        _ if actor.is_privileged() => true,
        TaskStatus::Canceled => actor.id == issue.creator(),
        TaskStatus::Pending | TaskStatus::Skipped => issue.assignee() == Some(actor.id),
        TaskStatus::PendingApproval => false,
    }
}
