//! Issues and the actors that work on them.

use super::{ActorId, IssueId, PipelineDomainError, PipelineId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    /// Work is in progress.
    Open,
    /// The pipeline finished.
    Done,
    /// The issue was canceled.
    Canceled,
}

/// Approval state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Waiting for approval.
    Pending,
    /// Approved; tasks may run.
    Approved,
}

/// Role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The scheduler itself.
    System,
    /// Workspace owner.
    Owner,
    /// Database administrator.
    Dba,
    /// Regular developer.
    Developer,
}

/// A principal changing task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identity.
    pub id: ActorId,
    /// Actor role.
    pub role: ActorRole,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(id: ActorId, role: ActorRole) -> Self {
        Self { id, role }
    }

    /// The scheduler's own identity.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            id: ActorId::SYSTEM,
            role: ActorRole::System,
        }
    }

    /// Returns `true` for roles allowed to change any task.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(
            self.role,
            ActorRole::System | ActorRole::Owner | ActorRole::Dba
        )
    }
}

/// A change request driving one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    id: IssueId,
    pipeline_id: PipelineId,
    name: String,
    status: IssueStatus,
    approval: ApprovalStatus,
    creator: ActorId,
    assignee: Option<ActorId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Issue {
    /// Creates an open issue awaiting approval.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::EmptyName`] for a blank name.
    pub fn new(
        pipeline_id: PipelineId,
        name: impl Into<String>,
        creator: ActorId,
        clock: &impl Clock,
    ) -> Result<Self, PipelineDomainError> {
        let issue_name = name.into();
        if issue_name.trim().is_empty() {
            return Err(PipelineDomainError::EmptyName("issue"));
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: IssueId::new(),
            pipeline_id,
            name: issue_name,
            status: IssueStatus::Open,
            approval: ApprovalStatus::Pending,
            creator,
            assignee: None,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Sets the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: ActorId) -> Self {
        self.assignee = Some(assignee);
        self
    }

    /// Returns the issue identifier.
    #[must_use]
    pub const fn id(&self) -> IssueId {
        self.id
    }

    /// Returns the pipeline driven by the issue.
    #[must_use]
    pub const fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> IssueStatus {
        self.status
    }

    /// Returns the approval status.
    #[must_use]
    pub const fn approval(&self) -> ApprovalStatus {
        self.approval
    }

    /// Returns `true` once approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }

    /// Returns the creator.
    #[must_use]
    pub const fn creator(&self) -> ActorId {
        self.creator
    }

    /// Returns the assignee, if any.
    #[must_use]
    pub const fn assignee(&self) -> Option<ActorId> {
        self.assignee
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Approves the issue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::IssueClosed`] unless the issue is open.
    pub fn approve(&mut self, clock: &impl Clock) -> Result<(), PipelineDomainError> {
        self.ensure_open()?;
        self.approval = ApprovalStatus::Approved;
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Cancels the issue.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::IssueClosed`] unless the issue is open.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), PipelineDomainError> {
        self.ensure_open()?;
        self.status = IssueStatus::Canceled;
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Marks an open issue done. Closed issues are left untouched.
    pub fn settle(&mut self, clock: &impl Clock) {
        if self.status == IssueStatus::Open {
            self.status = IssueStatus::Done;
            self.updated_at = clock.utc();
        }
    }

    /// Reopens a done issue, e.g. when one of its failed tasks is retried.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineDomainError::IssueClosed`] for a canceled issue.
    pub fn reopen(&mut self, clock: &impl Clock) -> Result<(), PipelineDomainError> {
        match self.status {
            IssueStatus::Open => Ok(()),
            IssueStatus::Done => {
                self.status = IssueStatus::Open;
                self.updated_at = clock.utc();
                Ok(())
            }
            IssueStatus::Canceled => Err(PipelineDomainError::IssueClosed(self.id)),
        }
    }

    const fn ensure_open(&self) -> Result<(), PipelineDomainError> {
        match self.status {
            IssueStatus::Open => Ok(()),
            IssueStatus::Done | IssueStatus::Canceled => {
                Err(PipelineDomainError::IssueClosed(self.id))
            }
        }
    }
}
