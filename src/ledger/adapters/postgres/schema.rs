//! Diesel schema for the migration history table.

diesel::table! {
    /// Applied migrations, one row per `(namespace, version)`.
    migration_history (id) {
        /// Storage identifier.
        id -> Int8,
        /// Actor that applied the change.
        created_by -> Text,
        /// Insert timestamp.
        created_at -> Timestamptz,
        /// Actor that last touched the row.
        updated_by -> Text,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Target database identity.
        namespace -> Text,
        /// Position within the namespace.
        sequence -> Int8,
        /// Origin of the change.
        source -> Text,
        /// Kind of change.
        #[sql_name = "type"]
        migration_type -> Text,
        /// Lexically ordered stored version.
        version -> Text,
        /// Human readable description.
        description -> Text,
        /// Applied statement.
        statement -> Text,
        /// Statement execution time in nanoseconds.
        execution_duration_ns -> Int8,
        /// Linked issue, if any.
        issue_id -> Nullable<Text>,
    }
}

/// Creates the history table and both uniqueness constraints.
pub const CREATE_MIGRATION_HISTORY: &str = "\
CREATE TABLE IF NOT EXISTS migration_history (
    id BIGSERIAL PRIMARY KEY,
    created_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    namespace TEXT NOT NULL,
    sequence BIGINT NOT NULL CHECK (sequence >= 0),
    source TEXT NOT NULL,
    type TEXT NOT NULL,
    version TEXT NOT NULL,
    description TEXT NOT NULL,
    statement TEXT NOT NULL,
    execution_duration_ns BIGINT NOT NULL,
    issue_id TEXT,
    CONSTRAINT migration_history_namespace_version_key UNIQUE (namespace, version),
    CONSTRAINT migration_history_namespace_sequence_key UNIQUE (namespace, sequence)
)";

/// Constraint guarding `(namespace, version)`.
pub const NAMESPACE_VERSION_CONSTRAINT: &str = "migration_history_namespace_version_key";

/// Constraint guarding `(namespace, sequence)`.
pub const NAMESPACE_SEQUENCE_CONSTRAINT: &str = "migration_history_namespace_sequence_key";
