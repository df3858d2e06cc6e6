//! The transactional apply protocol.
//!
//! [`apply_migration`] runs every step against a single
//! [`LedgerTransaction`]. Adapters open the transaction, call the protocol,
//! and commit only when it returns `Ok`; any error rolls the whole unit back,
//! statement included.

use super::{
    LedgerError, LedgerResult,
    domain::{
        MigrationHistory, MigrationInfo, MigrationType, Namespace, NewMigrationHistory,
        StoredVersion,
    },
};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info};

/// Operations the protocol needs from one open ledger transaction.
///
/// Implementations run every call on the same connection and transaction so
/// the statement and the history insert commit or roll back together.
pub trait LedgerTransaction {
    /// Finds the row recorded for `(namespace, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lookup fails.
    fn find_by_version(
        &mut self,
        namespace: &Namespace,
        version: &StoredVersion,
    ) -> LedgerResult<Option<MigrationHistory>>;

    /// Finds the row with the lexically greatest stored version.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lookup fails.
    fn find_highest_version(
        &mut self,
        namespace: &Namespace,
    ) -> LedgerResult<Option<MigrationHistory>>;

    /// Returns whether a baseline row exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lookup fails.
    fn has_baseline(&mut self, namespace: &Namespace) -> LedgerResult<bool>;

    /// Returns the largest sequence recorded for the namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] when the lookup fails.
    fn max_sequence(&mut self, namespace: &Namespace) -> LedgerResult<Option<u64>>;

    /// Executes the migration statement.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Execution`] when the statement fails.
    fn execute(&mut self, statement: &str) -> LedgerResult<()>;

    /// Inserts the history row.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyApplied`] or
    /// [`LedgerError::ConcurrentMigration`] when a uniqueness constraint
    /// fires, or [`LedgerError::Persistence`] on other failures.
    fn insert_history(&mut self, row: NewMigrationHistory) -> LedgerResult<MigrationHistory>;
}

/// Applies one change inside `tx` and returns the recorded history row.
///
/// Steps, in order: duplicate check, out-of-order check, baseline
/// precondition, sequence assignment, statement execution (skipped for
/// baselines and empty statements), history insert.
///
/// # Errors
///
/// Returns [`LedgerError::AlreadyApplied`], [`LedgerError::OutOfOrder`] or
/// [`LedgerError::NoBaseline`] when an ordering invariant would break, and
/// execution or persistence errors from the transaction. No step mutates
/// anything before every check has passed.
pub fn apply_migration<T>(
    tx: &mut T,
    info: &MigrationInfo,
    statement: &str,
    now: DateTime<Utc>,
) -> LedgerResult<MigrationHistory>
where
    T: LedgerTransaction + ?Sized,
{
    let namespace = info.namespace();
    let version = info.version();
    let stored = version.stored();

    if tx.find_by_version(namespace, &stored)?.is_some() {
        return Err(LedgerError::AlreadyApplied {
            namespace: namespace.clone(),
            version: version.to_string(),
        });
    }

    let highest = tx.find_highest_version(namespace)?;
    if let Some(applied) = highest.filter(|row| row.stored_version() > stored) {
        return Err(LedgerError::OutOfOrder {
            namespace: namespace.clone(),
            applied: applied.version.to_string(),
            version: version.to_string(),
        });
    }

    let is_baseline = info.migration_type() == MigrationType::Baseline;
    if !is_baseline && !tx.has_baseline(namespace)? {
        return Err(LedgerError::NoBaseline {
            namespace: namespace.clone(),
        });
    }

    let sequence = tx.max_sequence(namespace)?.map_or(1, |max| max + 1);

    let started = Instant::now();
    if is_baseline || statement.trim().is_empty() {
        debug!(%namespace, %version, "recording migration without executing a statement");
    } else {
        tx.execute(statement)?;
    }
    let execution_duration = started.elapsed();

    let recorded = tx.insert_history(NewMigrationHistory {
        created_by: info.creator().to_owned(),
        created_at: now,
        namespace: namespace.clone(),
        sequence,
        source: info.source(),
        migration_type: info.migration_type(),
        version: version.clone(),
        description: info.description(),
        statement: statement.to_owned(),
        execution_duration,
        issue_id: info.issue_id().map(str::to_owned),
    })?;

    info!(
        %namespace,
        %version,
        sequence,
        migration_type = info.migration_type().as_str(),
        elapsed_ms = execution_duration.as_millis(),
        "migration recorded"
    );
    Ok(recorded)
}
