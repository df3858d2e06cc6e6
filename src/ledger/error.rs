//! Ledger rejection and failure types.

use super::domain::{LedgerDomainError, Namespace};
use crate::error::ErrorCode;
use std::sync::Arc;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a rejected or failed migration apply.
///
/// Invariant violations carry the exact operator-facing message; storage and
/// statement failures wrap their source.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Metadata failed validation.
    #[error(transparent)]
    Domain(#[from] LedgerDomainError),

    /// `(namespace, version)` is already recorded.
    #[error("{namespace} has already applied version {version}")]
    AlreadyApplied {
        /// Target namespace.
        namespace: Namespace,
        /// Rejected version.
        version: String,
    },

    /// A lexically greater version is already recorded.
    #[error("{namespace} has already applied version {applied} which is higher than {version}")]
    OutOfOrder {
        /// Target namespace.
        namespace: Namespace,
        /// Highest version already applied.
        applied: String,
        /// Rejected version.
        version: String,
    },

    /// No baseline exists for an incremental change.
    #[error("{namespace} has not created migration baseline yet")]
    NoBaseline {
        /// Target namespace.
        namespace: Namespace,
    },

    /// Another writer claimed the same sequence number first.
    #[error("concurrent migration detected for {namespace}, please retry")]
    ConcurrentMigration {
        /// Target namespace.
        namespace: Namespace,
    },

    /// The migration statement failed; nothing was recorded.
    #[error("failed to execute migration statement: {0}")]
    Execution(Arc<dyn std::error::Error + Send + Sync>),

    /// Ledger storage failed.
    #[error("ledger persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Wraps a statement execution error.
    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Execution(Arc::new(err))
    }

    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Classifies the error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Domain(_) => ErrorCode::Invalid,
            Self::AlreadyApplied { .. } => ErrorCode::AlreadyApplied,
            Self::OutOfOrder { .. } => ErrorCode::OutOfOrder,
            Self::NoBaseline { .. } => ErrorCode::NoBaseline,
            Self::ConcurrentMigration { .. } | Self::Execution(_) | Self::Persistence(_) => {
                ErrorCode::Internal
            }
        }
    }
}
