//! Built-in check executors.

mod affected_rows;
mod connectivity;
mod ghost_sync;
mod migration_schema;
mod statement_advise;
mod statement_type;

pub use affected_rows::{AffectedRowsReportExecutor, DEFAULT_AFFECTED_ROWS_WARN_ABOVE};
pub use connectivity::DatabaseConnectExecutor;
pub use ghost_sync::GhostSyncExecutor;
pub use migration_schema::MigrationSchemaExecutor;
pub use statement_advise::{ADVISOR_NAMESPACE, StatementAdviseExecutor};
pub use statement_type::{
    ClassifiedStatement, StatementKind, StatementTypeExecutor, classify_statements,
};
