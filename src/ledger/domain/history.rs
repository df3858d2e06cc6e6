//! Migration history records.

use super::{MigrationSource, MigrationType, MigrationVersion, Namespace, StoredVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One applied change, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationHistory {
    /// Storage identifier.
    pub id: i64,
    /// Actor that applied the change.
    pub created_by: String,
    /// Time the row was written.
    pub created_at: DateTime<Utc>,
    /// Actor that last touched the row.
    pub updated_by: String,
    /// Time the row was last touched.
    pub updated_at: DateTime<Utc>,
    /// Target database identity.
    pub namespace: Namespace,
    /// Position of the change within the namespace, starting at 1.
    pub sequence: u64,
    /// Origin of the change.
    pub source: MigrationSource,
    /// Kind of change.
    pub migration_type: MigrationType,
    /// Version in its original form.
    pub version: MigrationVersion,
    /// Human readable description.
    pub description: String,
    /// Statement that was applied.
    pub statement: String,
    /// Time spent executing the statement.
    pub execution_duration: Duration,
    /// Issue the change belongs to, if any.
    pub issue_id: Option<String>,
}

impl MigrationHistory {
    /// Returns the lexically ordered storage form of the version.
    #[must_use]
    pub fn stored_version(&self) -> StoredVersion {
        self.version.stored()
    }
}

/// Row about to be inserted into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMigrationHistory {
    /// Actor applying the change.
    pub created_by: String,
    /// Insert time.
    pub created_at: DateTime<Utc>,
    /// Target database identity.
    pub namespace: Namespace,
    /// Assigned sequence.
    pub sequence: u64,
    /// Origin of the change.
    pub source: MigrationSource,
    /// Kind of change.
    pub migration_type: MigrationType,
    /// Version in its original form.
    pub version: MigrationVersion,
    /// Human readable description.
    pub description: String,
    /// Statement being applied.
    pub statement: String,
    /// Time spent executing the statement.
    pub execution_duration: Duration,
    /// Issue the change belongs to, if any.
    pub issue_id: Option<String>,
}

impl NewMigrationHistory {
    /// Materialises the row once storage has assigned an identifier.
    #[must_use]
    pub fn into_history(self, id: i64) -> MigrationHistory {
        MigrationHistory {
            id,
            updated_by: self.created_by.clone(),
            updated_at: self.created_at,
            created_by: self.created_by,
            created_at: self.created_at,
            namespace: self.namespace,
            sequence: self.sequence,
            source: self.source,
            migration_type: self.migration_type,
            version: self.version,
            description: self.description,
            statement: self.statement,
            execution_duration: self.execution_duration,
            issue_id: self.issue_id,
        }
    }
}

/// Filter for history lookups. Results are ordered newest sequence first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationHistoryFind {
    /// Restrict to one namespace.
    pub namespace: Option<Namespace>,
    /// Restrict to one version.
    pub version: Option<MigrationVersion>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl MigrationHistoryFind {
    /// Finds every row of `namespace`.
    #[must_use]
    pub fn for_namespace(namespace: Namespace) -> Self {
        Self {
            namespace: Some(namespace),
            ..Self::default()
        }
    }

    /// Restricts the lookup to one version.
    #[must_use]
    pub fn with_version(mut self, version: MigrationVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` when `row` satisfies the filter, ignoring the limit.
    #[must_use]
    pub fn matches(&self, row: &MigrationHistory) -> bool {
        self.namespace.as_ref().is_none_or(|ns| *ns == row.namespace)
            && self
                .version
                .as_ref()
                .is_none_or(|version| version.stored() == row.stored_version())
    }
}
