//! Diesel row models for migration history.

use super::schema::migration_history;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for migration history.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = migration_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MigrationHistoryRow {
    /// Storage identifier.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub id: i64,
    /// Actor that applied the change.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub created_by: String,
    /// Insert timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub created_at: DateTime<Utc>,
    /// Actor that last touched the row.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub updated_by: String,
    /// Last update timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub updated_at: DateTime<Utc>,
    /// Target namespace.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub namespace: String,
    /// Sequence within the namespace.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub sequence: i64,
    /// Origin of the change.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub source: String,
    /// Kind of change.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub migration_type: String,
    /// Stored version.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub version: String,
    /// Description.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub description: String,
    /// Applied statement.
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub statement: String,
    /// Execution time in nanoseconds.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub execution_duration_ns: i64,
    /// Linked issue.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Text>)]
    pub issue_id: Option<String>,
}

/// Insert model for migration history.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = migration_history)]
pub struct NewMigrationHistoryRow {
    /// Actor applying the change.
    pub created_by: String,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Same as `created_by` on insert.
    pub updated_by: String,
    /// Same as `created_at` on insert.
    pub updated_at: DateTime<Utc>,
    /// Target namespace.
    pub namespace: String,
    /// Assigned sequence.
    pub sequence: i64,
    /// Origin of the change.
    pub source: String,
    /// Kind of change.
    pub migration_type: String,
    /// Stored version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Applied statement.
    pub statement: String,
    /// Execution time in nanoseconds.
    pub execution_duration_ns: i64,
    /// Linked issue.
    pub issue_id: Option<String>,
}

/// Presence check for the history table.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct TablePresence {
    /// Whether the table exists in the current schema.
    #[diesel(sql_type = diesel::sql_types::Bool)]
    pub present: bool,
}

/// Aggregate query for the largest sequence.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct MaxSequence {
    /// Largest sequence, if any row exists.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Int8>)]
    pub max_sequence: Option<i64>,
}
