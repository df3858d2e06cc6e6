//! Database engines and the capabilities they advertise.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// `PostgreSQL`.
    Postgres,
    /// `MySQL`.
    MySql,
    /// `TiDB`.
    TiDb,
    /// `ClickHouse`.
    ClickHouse,
    /// Snowflake.
    Snowflake,
    /// `SQLite`.
    Sqlite,
}

/// Feature flags that decide which checks and executors apply to an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// SQL review (advisor) rules are available.
    pub sql_review: bool,
    /// Statements can be classified as DDL or DML.
    pub statement_type_check: bool,
    /// Affected rows can be estimated before a data change.
    pub affected_rows_report: bool,
    /// Online schema change through gh-ost is supported.
    pub ghost: bool,
}

impl Engine {
    /// Every engine, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Postgres,
        Self::MySql,
        Self::TiDb,
        Self::ClickHouse,
        Self::Snowflake,
        Self::Sqlite,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::TiDb => "tidb",
            Self::ClickHouse => "clickhouse",
            Self::Snowflake => "snowflake",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the capabilities advertised by the engine.
    #[must_use]
    pub const fn capabilities(self) -> EngineCapabilities {
        match self {
            Self::Postgres => EngineCapabilities {
                sql_review: true,
                statement_type_check: true,
                affected_rows_report: true,
                ghost: false,
            },
            Self::MySql => EngineCapabilities {
                sql_review: true,
                statement_type_check: true,
                affected_rows_report: true,
                ghost: true,
            },
            Self::TiDb => EngineCapabilities {
                sql_review: true,
                statement_type_check: true,
                affected_rows_report: false,
                ghost: false,
            },
            Self::ClickHouse | Self::Snowflake | Self::Sqlite => EngineCapabilities {
                sql_review: false,
                statement_type_check: false,
                affected_rows_report: false,
                ghost: false,
            },
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned while parsing an engine name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown database engine: {0}")]
pub struct ParseEngineError(pub String);

impl TryFrom<&str> for Engine {
    type Error = ParseEngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|engine| engine.as_str() == normalized)
            .ok_or_else(|| ParseEngineError(value.to_owned()))
    }
}
