//! Migration request metadata supplied to the ledger.

use super::{LedgerDomainError, MigrationVersion, ParseMigrationEnumError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a target database inside the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a validated namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerDomainError::EmptyNamespace`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, LedgerDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerDomainError::EmptyNamespace);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the namespace as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of change recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// Establishes the starting schema; the statement is recorded, never run.
    Baseline,
    /// Incremental schema change.
    Migrate,
    /// Schema change produced by branch merge.
    Branch,
    /// Data change.
    Data,
}

impl MigrationType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "BASELINE",
            Self::Migrate => "MIGRATE",
            Self::Branch => "BRANCH",
            Self::Data => "DATA",
        }
    }
}

impl TryFrom<&str> for MigrationType {
    type Error = ParseMigrationEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASELINE" => Ok(Self::Baseline),
            "MIGRATE" | "SQL" => Ok(Self::Migrate),
            "BRANCH" => Ok(Self::Branch),
            "DATA" => Ok(Self::Data),
            _ => Err(ParseMigrationEnumError::Type(value.to_owned())),
        }
    }
}

/// Where a migration originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationSource {
    /// Submitted through the console.
    Ui,
    /// Pushed to a version-control repository.
    Vcs,
    /// Applied by a library caller.
    Library,
}

impl MigrationSource {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "UI",
            Self::Vcs => "VCS",
            Self::Library => "LIBRARY",
        }
    }
}

impl TryFrom<&str> for MigrationSource {
    type Error = ParseMigrationEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "UI" => Ok(Self::Ui),
            "VCS" => Ok(Self::Vcs),
            "LIBRARY" => Ok(Self::Library),
            _ => Err(ParseMigrationEnumError::Source(value.to_owned())),
        }
    }
}

/// Everything the ledger needs to know about one change besides its
/// statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInfo {
    namespace: Namespace,
    database: String,
    version: MigrationVersion,
    migration_type: MigrationType,
    source: MigrationSource,
    environment: Option<String>,
    description: Option<String>,
    creator: String,
    issue_id: Option<String>,
    create_database: bool,
}

impl MigrationInfo {
    /// Creates migration metadata for `database`; the namespace defaults to
    /// the database name.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerDomainError::EmptyNamespace`] when the database name is
    /// blank.
    pub fn new(
        database: impl Into<String>,
        version: MigrationVersion,
        migration_type: MigrationType,
    ) -> Result<Self, LedgerDomainError> {
        let database_name = database.into();
        let namespace = Namespace::new(database_name.clone())?;
        Ok(Self {
            namespace,
            database: database_name,
            version,
            migration_type,
            source: MigrationSource::Library,
            environment: None,
            description: None,
            creator: String::from("system"),
            issue_id: None,
            create_database: false,
        })
    }

    /// Overrides the ledger namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Sets the origin of the migration.
    #[must_use]
    pub fn with_source(mut self, source: MigrationSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the environment the target database belongs to.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets an explicit description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let text = description.into();
        self.description = (!text.trim().is_empty()).then_some(text);
        self
    }

    /// Sets the actor recorded as `created_by`.
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Links the migration to an issue.
    #[must_use]
    pub fn with_issue_id(mut self, issue_id: impl Into<String>) -> Self {
        self.issue_id = Some(issue_id.into());
        self
    }

    /// Marks the migration as part of creating the database.
    #[must_use]
    pub fn with_create_database(mut self, create_database: bool) -> Self {
        self.create_database = create_database;
        self
    }

    /// Returns the ledger namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the target database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the version.
    #[must_use]
    pub const fn version(&self) -> &MigrationVersion {
        &self.version
    }

    /// Returns the migration type.
    #[must_use]
    pub const fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    /// Returns the migration source.
    #[must_use]
    pub const fn source(&self) -> MigrationSource {
        self.source
    }

    /// Returns the environment, if any.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Returns the creator.
    #[must_use]
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Returns the linked issue, if any.
    #[must_use]
    pub fn issue_id(&self) -> Option<&str> {
        self.issue_id.as_deref()
    }

    /// Returns whether the migration creates the database.
    #[must_use]
    pub const fn create_database(&self) -> bool {
        self.create_database
    }

    /// Returns the explicit description, or the default for the migration
    /// type.
    #[must_use]
    pub fn description(&self) -> String {
        if let Some(text) = &self.description {
            return text.clone();
        }
        match self.migration_type {
            MigrationType::Baseline => format!("Create {} baseline", self.database),
            MigrationType::Data => format!("Create {} data change", self.database),
            MigrationType::Migrate | MigrationType::Branch => {
                format!("Create {} schema migration", self.database)
            }
        }
    }
}
