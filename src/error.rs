//! Crate-wide error classification.
//!
//! Every failure that reaches a task, a check run, or a caller is classified
//! with an [`ErrorCode`] so operators can tell a deterministic rejection from
//! an infrastructure fault.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification shared by ledger, scheduler, and state-machine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No error.
    Ok,
    /// A guard was violated; nothing was mutated.
    Invalid,
    /// The migration version is already recorded for the namespace.
    AlreadyApplied,
    /// A higher migration version is already recorded for the namespace.
    OutOfOrder,
    /// An incremental migration was attempted before any baseline.
    NoBaseline,
    /// Storage or driver failure; the caller must re-check state.
    Internal,
    /// The feature is not available for this engine or deployment.
    NotImplemented,
}

impl ErrorCode {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Invalid => "INVALID",
            Self::AlreadyApplied => "ALREADY_APPLIED",
            Self::OutOfOrder => "OUT_OF_ORDER",
            Self::NoBaseline => "NO_BASELINE",
            Self::Internal => "INTERNAL",
            Self::NotImplemented => "NOT_IMPLEMENTED",
        }
    }

    /// Returns `true` for deterministic rejections that are safe to surface
    /// verbatim and retry only after the input is corrected.
    #[must_use]
    pub const fn is_deterministic(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::AlreadyApplied | Self::OutOfOrder | Self::NoBaseline
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
