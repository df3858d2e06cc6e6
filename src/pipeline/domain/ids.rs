//! Identifier types for the pipeline domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the wrapped UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a pipeline.
    PipelineId
);
uuid_identifier!(
    /// Unique identifier for a stage.
    StageId
);
uuid_identifier!(
    /// Unique identifier for a task.
    TaskId
);
uuid_identifier!(
    /// Unique identifier for a task check run.
    TaskCheckRunId
);
uuid_identifier!(
    /// Unique identifier for an issue.
    IssueId
);
uuid_identifier!(
    /// Unique identifier for a database instance.
    InstanceId
);
uuid_identifier!(
    /// Unique identifier for a database on an instance.
    DatabaseId
);
uuid_identifier!(
    /// Unique identifier for a principal acting on tasks.
    ActorId
);

impl ActorId {
    /// The scheduler's own identity.
    pub const SYSTEM: Self = Self(Uuid::nil());

    /// Returns `true` for the scheduler's own identity.
    #[must_use]
    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}
