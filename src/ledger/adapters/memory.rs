//! In-memory drivers for tests and local runs.
//!
//! Each [`InMemoryDriver`] models one database. A migration runs against a
//! copy of the database state, which replaces the original only when the
//! protocol succeeds, so failures leave no partial effect.

use crate::ledger::{
    LedgerError, LedgerResult,
    domain::{
        MigrationHistory, MigrationHistoryFind, MigrationInfo, MigrationType, Namespace,
        NewMigrationHistory, StoredVersion,
    },
    ports::{ConnectionTarget, Driver, DriverError, DriverProvider, DriverResult},
    protocol::{LedgerTransaction, apply_migration},
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct InMemoryDatabase {
    migration_schema_ready: bool,
    reachable_override: Option<String>,
    history: Vec<MigrationHistory>,
    executed: Vec<String>,
    failing_fragments: Vec<String>,
    next_history_id: i64,
}

impl InMemoryDatabase {
    fn run(&mut self, statement: &str) -> Result<(), std::io::Error> {
        if let Some(fragment) = self
            .failing_fragments
            .iter()
            .find(|fragment| statement.contains(fragment.as_str()))
        {
            return Err(std::io::Error::other(format!(
                "statement rejected by database: matched '{fragment}'"
            )));
        }
        self.executed.push(statement.to_owned());
        Ok(())
    }
}

struct InMemoryTransaction<'a> {
    working: &'a mut InMemoryDatabase,
}

impl LedgerTransaction for InMemoryTransaction<'_> {
    fn find_by_version(
        &mut self,
        namespace: &Namespace,
        version: &StoredVersion,
    ) -> LedgerResult<Option<MigrationHistory>> {
        Ok(self
            .working
            .history
            .iter()
            .find(|row| row.namespace == *namespace && row.stored_version() == *version)
            .cloned())
    }

    fn find_highest_version(
        &mut self,
        namespace: &Namespace,
    ) -> LedgerResult<Option<MigrationHistory>> {
        Ok(self
            .working
            .history
            .iter()
            .filter(|row| row.namespace == *namespace)
            .max_by_key(|row| row.stored_version())
            .cloned())
    }

    fn has_baseline(&mut self, namespace: &Namespace) -> LedgerResult<bool> {
        Ok(self
            .working
            .history
            .iter()
            .any(|row| row.namespace == *namespace && row.migration_type == MigrationType::Baseline))
    }

    fn max_sequence(&mut self, namespace: &Namespace) -> LedgerResult<Option<u64>> {
        Ok(self
            .working
            .history
            .iter()
            .filter(|row| row.namespace == *namespace)
            .map(|row| row.sequence)
            .max())
    }

    fn execute(&mut self, statement: &str) -> LedgerResult<()> {
        self.working.run(statement).map_err(LedgerError::execution)
    }

    fn insert_history(&mut self, row: NewMigrationHistory) -> LedgerResult<MigrationHistory> {
        let clashes = |existing: &&MigrationHistory| existing.namespace == row.namespace;
        if self
            .working
            .history
            .iter()
            .filter(clashes)
            .any(|existing| existing.stored_version() == row.version.stored())
        {
            return Err(LedgerError::AlreadyApplied {
                namespace: row.namespace.clone(),
                version: row.version.to_string(),
            });
        }
        if self
            .working
            .history
            .iter()
            .filter(clashes)
            .any(|existing| existing.sequence == row.sequence)
        {
            return Err(LedgerError::ConcurrentMigration {
                namespace: row.namespace.clone(),
            });
        }

        self.working.next_history_id += 1;
        let recorded = row.into_history(self.working.next_history_id);
        self.working.history.push(recorded.clone());
        Ok(recorded)
    }
}

/// Thread-safe in-memory database implementing [`Driver`].
pub struct InMemoryDriver<C: Clock + Send + Sync> {
    state: Arc<Mutex<InMemoryDatabase>>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> Clone for InMemoryDriver<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock + Send + Sync> InMemoryDriver<C> {
    /// Creates an empty database without a migration history table.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryDatabase::default())),
            clock,
        }
    }

    fn lock(&self) -> DriverResult<MutexGuard<'_, InMemoryDatabase>> {
        self.state
            .lock()
            .map_err(|err| DriverError::driver(std::io::Error::other(err.to_string())))
    }

    /// Makes every statement containing `fragment` fail.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Driver`] when the state lock is poisoned.
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) -> DriverResult<()> {
        self.lock()?.failing_fragments.push(fragment.into());
        Ok(())
    }

    /// Makes `ping` and statement execution fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Driver`] when the state lock is poisoned.
    pub fn set_unreachable(&self, reason: impl Into<String>) -> DriverResult<()> {
        self.lock()?.reachable_override = Some(reason.into());
        Ok(())
    }

    /// Returns every statement executed so far, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Driver`] when the state lock is poisoned.
    pub fn executed_statements(&self) -> DriverResult<Vec<String>> {
        Ok(self.lock()?.executed.clone())
    }

    fn ensure_reachable(state: &InMemoryDatabase) -> DriverResult<()> {
        match &state.reachable_override {
            Some(reason) => Err(DriverError::Connection {
                target: String::from("in-memory database"),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<C> Driver for InMemoryDriver<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn ping(&self) -> DriverResult<()> {
        Self::ensure_reachable(&*self.lock()?)
    }

    async fn execute(&self, statement: &str) -> DriverResult<()> {
        let mut state = self.lock()?;
        Self::ensure_reachable(&state)?;
        state.run(statement).map_err(DriverError::driver)
    }

    async fn needs_setup_migration(&self) -> DriverResult<bool> {
        let state = self.lock()?;
        Self::ensure_reachable(&state)?;
        Ok(!state.migration_schema_ready)
    }

    async fn setup_migration_if_needed(&self) -> DriverResult<()> {
        let mut state = self.lock()?;
        Self::ensure_reachable(&state)?;
        state.migration_schema_ready = true;
        Ok(())
    }

    async fn execute_migration(
        &self,
        info: &MigrationInfo,
        statement: &str,
    ) -> DriverResult<MigrationHistory> {
        let now = self.clock.utc();
        let mut state = self.lock()?;
        Self::ensure_reachable(&state)?;

        // The history table is created inside the transaction and rolls back
        // with it.
        let mut working = state.clone();
        working.migration_schema_ready = true;
        let recorded = apply_migration(
            &mut InMemoryTransaction {
                working: &mut working,
            },
            info,
            statement,
            now,
        )?;
        *state = working;
        Ok(recorded)
    }

    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> DriverResult<Vec<MigrationHistory>> {
        let state = self.lock()?;
        let mut rows: Vec<MigrationHistory> = state
            .history
            .iter()
            .filter(|row| find.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|left, right| right.sequence.cmp(&left.sequence));
        if let Some(limit) = find.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

/// Hands out one [`InMemoryDriver`] per connection target, creating
/// databases on first use.
pub struct InMemoryDriverProvider<C: Clock + Send + Sync> {
    drivers: Arc<RwLock<HashMap<ConnectionTarget, InMemoryDriver<C>>>>,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> Clone for InMemoryDriverProvider<C> {
    fn clone(&self) -> Self {
        Self {
            drivers: Arc::clone(&self.drivers),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> InMemoryDriverProvider<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a provider with no databases.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            drivers: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Returns the concrete driver for `target`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Driver`] when the registry lock is poisoned.
    pub fn driver(&self, target: &ConnectionTarget) -> DriverResult<InMemoryDriver<C>> {
        let mut drivers = self
            .drivers
            .write()
            .map_err(|err| DriverError::driver(std::io::Error::other(err.to_string())))?;
        Ok(drivers
            .entry(target.clone())
            .or_insert_with(|| InMemoryDriver::new(Arc::clone(&self.clock)))
            .clone())
    }
}

#[async_trait]
impl<C> DriverProvider for InMemoryDriverProvider<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn open(&self, target: &ConnectionTarget) -> DriverResult<Arc<dyn Driver>> {
        Ok(Arc::new(self.driver(target)?))
    }
}
