//! Driver port: the per-engine capability the orchestrator executes SQL
//! through.

use crate::{
    engine::Engine,
    error::ErrorCode,
    ledger::{
        LedgerError,
        domain::{MigrationHistory, MigrationHistoryFind, MigrationInfo},
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Contract every engine driver satisfies.
///
/// `execute_migration` must run the ledger protocol in a single transaction
/// together with the statement it applies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Verifies the target is reachable.
    async fn ping(&self) -> DriverResult<()>;

    /// Executes a statement outside the ledger.
    async fn execute(&self, statement: &str) -> DriverResult<()>;

    /// Returns `true` when the migration history table is missing.
    async fn needs_setup_migration(&self) -> DriverResult<bool>;

    /// Creates the migration history table when it is missing.
    async fn setup_migration_if_needed(&self) -> DriverResult<()>;

    /// Applies `statement` and records it, exactly once and in version order.
    ///
    /// A missing history table is created in the same transaction, so a
    /// first incremental change is rejected as missing its baseline.
    async fn execute_migration(
        &self,
        info: &MigrationInfo,
        statement: &str,
    ) -> DriverResult<MigrationHistory>;

    /// Lists recorded migrations, newest sequence first.
    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> DriverResult<Vec<MigrationHistory>>;
}

/// Where a driver connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Instance identity, opaque to the driver layer.
    pub instance: String,
    /// Instance engine.
    pub engine: Engine,
    /// Database to connect to; `None` addresses the instance itself.
    pub database: Option<String>,
}

impl ConnectionTarget {
    /// Targets a database on an instance.
    #[must_use]
    pub fn database(instance: impl Into<String>, engine: Engine, database: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            engine,
            database: Some(database.into()),
        }
    }

    /// Targets the instance without selecting a database.
    #[must_use]
    pub fn instance(instance: impl Into<String>, engine: Engine) -> Self {
        Self {
            instance: instance.into(),
            engine,
            database: None,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}/{}/{database}", self.engine, self.instance),
            None => write!(f, "{}/{}", self.engine, self.instance),
        }
    }
}

/// Opens drivers for connection targets.
#[async_trait]
pub trait DriverProvider: Send + Sync {
    /// Returns a driver connected to `target`.
    async fn open(&self, target: &ConnectionTarget) -> DriverResult<Arc<dyn Driver>>;
}

/// Errors returned by drivers.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The ledger rejected or failed the migration.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The target could not be reached.
    #[error("cannot connect to {target}: {reason}")]
    Connection {
        /// Target that failed.
        target: String,
        /// Failure description.
        reason: String,
    },

    /// The engine does not support the operation.
    #[error("{0} is not supported by this driver")]
    NotImplemented(String),

    /// Statement or protocol failure.
    #[error("driver error: {0}")]
    Driver(Arc<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    /// Wraps an engine-level error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Arc::new(err))
    }

    /// Classifies the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Ledger(err) => err.code(),
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::Connection { .. } | Self::Driver(_) => ErrorCode::Internal,
        }
    }
}
