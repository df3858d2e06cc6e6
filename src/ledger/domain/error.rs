//! Errors raised while constructing ledger values.

use thiserror::Error;

/// Validation failures for ledger domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerDomainError {
    /// Namespace was blank.
    #[error("namespace must not be empty")]
    EmptyNamespace,

    /// Version was blank.
    #[error("migration version must not be empty")]
    EmptyVersion,

    /// Semantic version did not parse as `major.minor.patch`.
    #[error("invalid semantic version '{0}', expected major.minor.patch")]
    InvalidSemanticVersion(String),

    /// A semantic version component does not fit four digits.
    #[error("semantic version '{0}' has a component of 10000 or larger")]
    SemanticComponentTooLarge(String),

    /// Stored version matched neither encoding.
    #[error("invalid stored version '{0}'")]
    InvalidStoredVersion(String),

    /// Migration file name does not follow the naming convention.
    #[error("invalid migration file name '{name}': {reason}")]
    InvalidFileName {
        /// Offending file name.
        name: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Error returned while parsing ledger enums from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseMigrationEnumError {
    /// Unknown migration type.
    #[error("unknown migration type: {0}")]
    Type(String),
    /// Unknown migration source.
    #[error("unknown migration source: {0}")]
    Source(String),
}
