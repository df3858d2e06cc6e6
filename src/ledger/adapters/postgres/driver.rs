//! `PostgreSQL` driver running the ledger protocol in one serializable
//! transaction.

use super::{
    models::{MaxSequence, MigrationHistoryRow, NewMigrationHistoryRow, TablePresence},
    schema::{
        CREATE_MIGRATION_HISTORY, NAMESPACE_SEQUENCE_CONSTRAINT, NAMESPACE_VERSION_CONSTRAINT,
        migration_history,
    },
};
use crate::ledger::{
    LedgerError, LedgerResult,
    domain::{
        MigrationHistory, MigrationHistoryFind, MigrationInfo, MigrationSource, MigrationType,
        MigrationVersion, Namespace, NewMigrationHistory, StoredVersion,
    },
    ports::{ConnectionTarget, Driver, DriverError, DriverProvider, DriverResult},
    protocol::{LedgerTransaction, apply_migration},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

/// `PostgreSQL` connection pool type used by the ledger adapter.
pub type LedgerPgPool = Pool<ConnectionManager<PgConnection>>;

const MAX_SERIALIZATION_ATTEMPTS: u32 = 3;

const HISTORY_COLUMNS: &str = "id, created_by, created_at, updated_by, updated_at, namespace, \
     sequence, source, type AS migration_type, version, description, statement, \
     execution_duration_ns, issue_id";

/// `PostgreSQL`-backed driver for one database.
pub struct PostgresDriver<C: Clock + Send + Sync> {
    pool: LedgerPgPool,
    clock: Arc<C>,
}

impl<C: Clock + Send + Sync> Clone for PostgresDriver<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> PostgresDriver<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a driver over an existing pool.
    #[must_use]
    pub const fn new(pool: LedgerPgPool, clock: Arc<C>) -> Self {
        Self { pool, clock }
    }

    async fn run_blocking<F, T>(&self, f: F) -> DriverResult<T>
    where
        F: FnOnce(&mut PgConnection) -> DriverResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(DriverError::driver)?;
            f(&mut connection)
        })
        .await
        .map_err(DriverError::driver)?
    }
}

#[async_trait]
impl<C> Driver for PostgresDriver<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn ping(&self) -> DriverResult<()> {
        self.run_blocking(|connection| {
            connection
                .batch_execute("SELECT 1")
                .map_err(DriverError::driver)
        })
        .await
    }

    async fn execute(&self, statement: &str) -> DriverResult<()> {
        let owned = statement.to_owned();
        self.run_blocking(move |connection| {
            connection
                .batch_execute(&owned)
                .map_err(DriverError::driver)
        })
        .await
    }

    async fn needs_setup_migration(&self) -> DriverResult<bool> {
        self.run_blocking(|connection| {
            let presence = diesel::sql_query(concat!(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables ",
                "WHERE table_schema = current_schema() ",
                "AND table_name = 'migration_history') AS present",
            ))
            .get_result::<TablePresence>(connection)
            .map_err(DriverError::driver)?;
            Ok(!presence.present)
        })
        .await
    }

    async fn setup_migration_if_needed(&self) -> DriverResult<()> {
        self.run_blocking(|connection| {
            connection
                .batch_execute(CREATE_MIGRATION_HISTORY)
                .map_err(DriverError::driver)
        })
        .await
    }

    async fn execute_migration(
        &self,
        info: &MigrationInfo,
        statement: &str,
    ) -> DriverResult<MigrationHistory> {
        let owned_info = info.clone();
        let owned_statement = statement.to_owned();
        let now = self.clock.utc();
        self.run_blocking(move |connection| {
            apply_with_retry(connection, &owned_info, &owned_statement, now)
        })
        .await
    }

    async fn find_migration_history_list(
        &self,
        find: &MigrationHistoryFind,
    ) -> DriverResult<Vec<MigrationHistory>> {
        let filter = find.clone();
        self.run_blocking(move |connection| {
            let mut query = migration_history::table
                .select(MigrationHistoryRow::as_select())
                .order(migration_history::sequence.desc())
                .into_boxed();
            if let Some(namespace) = &filter.namespace {
                query = query.filter(migration_history::namespace.eq(namespace.as_str().to_owned()));
            }
            if let Some(version) = &filter.version {
                query = query.filter(migration_history::version.eq(version.stored().as_str().to_owned()));
            }
            if let Some(limit) = filter.limit {
                query = query.limit(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            let rows = query
                .load::<MigrationHistoryRow>(connection)
                .map_err(DriverError::driver)?;
            rows.into_iter()
                .map(|row| row_to_history(row).map_err(DriverError::from))
                .collect()
        })
        .await
    }
}

enum TransactionError {
    Ledger(LedgerError),
    Diesel(DieselError),
}

impl From<DieselError> for TransactionError {
    fn from(err: DieselError) -> Self {
        Self::Diesel(err)
    }
}

fn apply_with_retry(
    connection: &mut PgConnection,
    info: &MigrationInfo,
    statement: &str,
    now: DateTime<Utc>,
) -> DriverResult<MigrationHistory> {
    let mut attempt = 1;
    loop {
        let outcome = connection
            .build_transaction()
            .serializable()
            .run(|conn| {
                conn.batch_execute(CREATE_MIGRATION_HISTORY)?;
                let mut tx = PgLedgerTransaction { connection: conn };
                apply_migration(&mut tx, info, statement, now).map_err(TransactionError::Ledger)
            });

        let retryable = match &outcome {
            Err(TransactionError::Diesel(err)) => is_serialization_failure(err),
            Err(TransactionError::Ledger(
                LedgerError::Persistence(source) | LedgerError::Execution(source),
            )) => source
                .downcast_ref::<DieselError>()
                .is_some_and(is_serialization_failure),
            Ok(_) | Err(TransactionError::Ledger(_)) => false,
        };
        if retryable && attempt < MAX_SERIALIZATION_ATTEMPTS {
            warn!(
                namespace = %info.namespace(),
                version = %info.version(),
                attempt,
                "serialization failure while applying migration, retrying"
            );
            attempt += 1;
            continue;
        }

        return match outcome {
            Ok(recorded) => Ok(recorded),
            Err(TransactionError::Ledger(err)) => Err(err.into()),
            Err(TransactionError::Diesel(err)) => Err(LedgerError::persistence(err).into()),
        };
    }
}

fn is_serialization_failure(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
    )
}

struct PgLedgerTransaction<'a> {
    connection: &'a mut PgConnection,
}

impl LedgerTransaction for PgLedgerTransaction<'_> {
    fn find_by_version(
        &mut self,
        namespace: &Namespace,
        version: &StoredVersion,
    ) -> LedgerResult<Option<MigrationHistory>> {
        let row = migration_history::table
            .filter(migration_history::namespace.eq(namespace.as_str()))
            .filter(migration_history::version.eq(version.as_str()))
            .select(MigrationHistoryRow::as_select())
            .first::<MigrationHistoryRow>(self.connection)
            .optional()
            .map_err(LedgerError::persistence)?;
        row.map(row_to_history).transpose()
    }

    fn find_highest_version(
        &mut self,
        namespace: &Namespace,
    ) -> LedgerResult<Option<MigrationHistory>> {
        // Byte-wise ordering regardless of the database collation.
        let query = format!(
            "SELECT {HISTORY_COLUMNS} FROM migration_history WHERE namespace = $1 \
             ORDER BY version COLLATE \"C\" DESC LIMIT 1"
        );
        let row = diesel::sql_query(query)
            .bind::<diesel::sql_types::Text, _>(namespace.as_str())
            .get_result::<MigrationHistoryRow>(self.connection)
            .optional()
            .map_err(LedgerError::persistence)?;
        row.map(row_to_history).transpose()
    }

    fn has_baseline(&mut self, namespace: &Namespace) -> LedgerResult<bool> {
        diesel::select(diesel::dsl::exists(
            migration_history::table
                .filter(migration_history::namespace.eq(namespace.as_str()))
                .filter(migration_history::migration_type.eq(MigrationType::Baseline.as_str())),
        ))
        .get_result::<bool>(self.connection)
        .map_err(LedgerError::persistence)
    }

    fn max_sequence(&mut self, namespace: &Namespace) -> LedgerResult<Option<u64>> {
        let row = diesel::sql_query(
            "SELECT MAX(sequence) AS max_sequence FROM migration_history WHERE namespace = $1",
        )
        .bind::<diesel::sql_types::Text, _>(namespace.as_str())
        .get_result::<MaxSequence>(self.connection)
        .map_err(LedgerError::persistence)?;
        row
            .max_sequence
            .map(u64::try_from)
            .transpose()
            .map_err(LedgerError::persistence)
    }

    fn execute(&mut self, statement: &str) -> LedgerResult<()> {
        self.connection
            .batch_execute(statement)
            .map_err(LedgerError::execution)
    }

    fn insert_history(&mut self, row: NewMigrationHistory) -> LedgerResult<MigrationHistory> {
        let insert = to_new_row(&row)?;
        let id = diesel::insert_into(migration_history::table)
            .values(&insert)
            .returning(migration_history::id)
            .get_result::<i64>(self.connection)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                    if constraint_is(info.as_ref(), NAMESPACE_VERSION_CONSTRAINT) =>
                {
                    LedgerError::AlreadyApplied {
                        namespace: row.namespace.clone(),
                        version: row.version.to_string(),
                    }
                }
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                    if constraint_is(info.as_ref(), NAMESPACE_SEQUENCE_CONSTRAINT) =>
                {
                    LedgerError::ConcurrentMigration {
                        namespace: row.namespace.clone(),
                    }
                }
                _ => LedgerError::persistence(err),
            })?;
        Ok(row.into_history(id))
    }
}

fn constraint_is(info: &dyn DatabaseErrorInformation, name: &str) -> bool {
    info.constraint_name().is_some_and(|constraint| constraint == name)
}

fn to_new_row(row: &NewMigrationHistory) -> LedgerResult<NewMigrationHistoryRow> {
    Ok(NewMigrationHistoryRow {
        created_by: row.created_by.clone(),
        created_at: row.created_at,
        updated_by: row.created_by.clone(),
        updated_at: row.created_at,
        namespace: row.namespace.as_str().to_owned(),
        sequence: i64::try_from(row.sequence).map_err(LedgerError::persistence)?,
        source: row.source.as_str().to_owned(),
        migration_type: row.migration_type.as_str().to_owned(),
        version: row.version.stored().as_str().to_owned(),
        description: row.description.clone(),
        statement: row.statement.clone(),
        execution_duration_ns: i64::try_from(row.execution_duration.as_nanos())
            .unwrap_or(i64::MAX),
        issue_id: row.issue_id.clone(),
    })
}

fn row_to_history(row: MigrationHistoryRow) -> LedgerResult<MigrationHistory> {
    let MigrationHistoryRow {
        id,
        created_by,
        created_at,
        updated_by,
        updated_at,
        namespace,
        sequence,
        source,
        migration_type,
        version,
        description,
        statement,
        execution_duration_ns,
        issue_id,
    } = row;

    Ok(MigrationHistory {
        id,
        created_by,
        created_at,
        updated_by,
        updated_at,
        namespace: Namespace::new(namespace)?,
        sequence: u64::try_from(sequence).map_err(LedgerError::persistence)?,
        source: MigrationSource::try_from(source.as_str()).map_err(LedgerError::persistence)?,
        migration_type: MigrationType::try_from(migration_type.as_str())
            .map_err(LedgerError::persistence)?,
        version: MigrationVersion::from_stored(&StoredVersion::from_persisted(version))?,
        description,
        statement,
        execution_duration: Duration::from_nanos(
            u64::try_from(execution_duration_ns).unwrap_or_default(),
        ),
        issue_id,
    })
}

/// Opens pooled [`PostgresDriver`]s from per-instance connection URL
/// templates.
///
/// Templates contain a `{database}` placeholder; instance-level targets
/// connect to the `postgres` maintenance database.
pub struct PostgresDriverProvider<C: Clock + Send + Sync> {
    templates: HashMap<String, String>,
    pools: Arc<RwLock<HashMap<ConnectionTarget, LedgerPgPool>>>,
    clock: Arc<C>,
}

impl<C> PostgresDriverProvider<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a provider with no registered instances.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            templates: HashMap::new(),
            pools: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Registers the URL template for an instance.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>, url_template: impl Into<String>) -> Self {
        self.templates.insert(instance.into(), url_template.into());
        self
    }

    fn cached_pool(&self, target: &ConnectionTarget) -> DriverResult<Option<LedgerPgPool>> {
        let pools = self
            .pools
            .read()
            .map_err(|err| DriverError::driver(std::io::Error::other(err.to_string())))?;
        Ok(pools.get(target).cloned())
    }
}

#[async_trait]
impl<C> DriverProvider for PostgresDriverProvider<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn open(&self, target: &ConnectionTarget) -> DriverResult<Arc<dyn Driver>> {
        if let Some(pool) = self.cached_pool(target)? {
            return Ok(Arc::new(PostgresDriver::new(pool, Arc::clone(&self.clock))));
        }

        let template = self
            .templates
            .get(&target.instance)
            .ok_or_else(|| DriverError::Connection {
                target: target.to_string(),
                reason: String::from("instance is not registered"),
            })?;
        let database = target.database.as_deref().unwrap_or("postgres");
        let url = template.replace("{database}", database);

        let pool = tokio::task::spawn_blocking(move || {
            Pool::builder()
                .max_size(4)
                .build(ConnectionManager::<PgConnection>::new(url))
        })
        .await
        .map_err(DriverError::driver)?
        .map_err(|err| DriverError::Connection {
            target: target.to_string(),
            reason: err.to_string(),
        })?;

        self.pools
            .write()
            .map_err(|err| DriverError::driver(std::io::Error::other(err.to_string())))?
            .insert(target.clone(), pool.clone());
        Ok(Arc::new(PostgresDriver::new(pool, Arc::clone(&self.clock))))
    }
}
