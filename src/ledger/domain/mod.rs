//! Domain model for the migration ledger.
//!
//! Versions, namespaces and history rows carry no infrastructure concerns;
//! the transactional apply protocol lives in [`crate::ledger::protocol`].

mod error;
mod file_name;
mod history;
mod info;
mod version;

pub use error::{LedgerDomainError, ParseMigrationEnumError};
pub use file_name::parse_migration_file_name;
pub use history::{MigrationHistory, MigrationHistoryFind, NewMigrationHistory};
pub use info::{MigrationInfo, MigrationSource, MigrationType, Namespace};
pub use version::{MigrationVersion, SemanticVersion, StoredVersion};
