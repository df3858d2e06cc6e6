//! Migration versions and their lexically ordered storage form.
//!
//! Versions are compared as plain strings. `0002` sorts after `0001b`, but
//! `10` sorts before `9`: authors must zero-pad numeric versions. Semantic
//! versions are zero-padded into the stored form so they order numerically.

use super::LedgerDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

const NON_SEMANTIC_PREFIX: &str = "0000.0000.0000-";
const MAX_SEMANTIC_COMPONENT: u64 = 9_999;

/// Parsed `major.minor.patch` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemanticVersion {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl SemanticVersion {
    /// Parses `major.minor.patch`, tolerating a leading `v`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerDomainError::InvalidSemanticVersion`] when the value is
    /// not a numeric triple and
    /// [`LedgerDomainError::SemanticComponentTooLarge`] when any component is
    /// 10000 or larger.
    pub fn parse(value: &str) -> Result<Self, LedgerDomainError> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let invalid = || LedgerDomainError::InvalidSemanticVersion(value.to_owned());

        let mut parts = digits.split('.');
        let mut next = || -> Result<u64, LedgerDomainError> {
            parts
                .next()
                .ok_or_else(invalid)?
                .parse::<u64>()
                .map_err(|_| invalid())
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        for component in [major, minor, patch] {
            if component > MAX_SEMANTIC_COMPONENT {
                return Err(LedgerDomainError::SemanticComponentTooLarge(value.to_owned()));
            }
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version string as written to the ledger's `version` column.
///
/// Ordering is byte-wise lexical, which is exactly what the ledger's
/// out-of-order check relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredVersion(String);

impl StoredVersion {
    /// Wraps a value read back from storage.
    #[must_use]
    pub fn from_persisted(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the stored string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A migration version as supplied by the migration author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum MigrationVersion {
    /// Opaque version compared lexically.
    Plain {
        /// Author-supplied version.
        version: String,
    },
    /// Semantic version with a free-form suffix, usually a timestamp.
    Semantic {
        /// Parsed version triple.
        version: SemanticVersion,
        /// Suffix distinguishing changes that share a version triple.
        suffix: String,
    },
}

impl MigrationVersion {
    /// Creates an opaque, lexically compared version.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerDomainError::EmptyVersion`] when the version is blank.
    pub fn plain(version: impl Into<String>) -> Result<Self, LedgerDomainError> {
        let value = version.into();
        if value.trim().is_empty() {
            return Err(LedgerDomainError::EmptyVersion);
        }
        Ok(Self::Plain { version: value })
    }

    /// Creates a semantic version with a suffix.
    ///
    /// # Errors
    ///
    /// Returns an error when the version does not parse as `major.minor.patch`
    /// or a component does not fit the four-digit stored form.
    pub fn semantic(version: &str, suffix: impl Into<String>) -> Result<Self, LedgerDomainError> {
        Ok(Self::Semantic {
            version: SemanticVersion::parse(version)?,
            suffix: suffix.into(),
        })
    }

    /// Returns `true` for the semantic scheme.
    #[must_use]
    pub const fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic { .. })
    }

    /// Encodes the version into its lexically ordered storage form.
    #[must_use]
    pub fn stored(&self) -> StoredVersion {
        match self {
            Self::Plain { version } => StoredVersion(format!("{NON_SEMANTIC_PREFIX}{version}")),
            Self::Semantic { version, suffix } => StoredVersion(format!(
                "{:04}.{:04}.{:04}-{suffix}",
                version.major, version.minor, version.patch
            )),
        }
    }

    /// Decodes a stored version.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerDomainError::InvalidStoredVersion`] when the stored
    /// value matches neither encoding.
    pub fn from_stored(stored: &StoredVersion) -> Result<Self, LedgerDomainError> {
        let raw = stored.as_str();
        if let Some(version) = raw.strip_prefix(NON_SEMANTIC_PREFIX) {
            return Self::plain(version)
                .map_err(|_| LedgerDomainError::InvalidStoredVersion(raw.to_owned()));
        }

        let (triple, suffix) = raw
            .split_once('-')
            .ok_or_else(|| LedgerDomainError::InvalidStoredVersion(raw.to_owned()))?;
        let version = SemanticVersion::parse(triple)
            .map_err(|_| LedgerDomainError::InvalidStoredVersion(raw.to_owned()))?;
        Ok(Self::Semantic {
            version,
            suffix: suffix.to_owned(),
        })
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { version } => f.write_str(version),
            Self::Semantic { version, suffix } if suffix.is_empty() => write!(f, "{version}"),
            Self::Semantic { version, suffix } => write!(f, "{version}-{suffix}"),
        }
    }
}
