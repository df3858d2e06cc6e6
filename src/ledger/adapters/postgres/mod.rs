//! `PostgreSQL` ledger adapter.

mod driver;
mod models;
mod schema;

pub use driver::{LedgerPgPool, PostgresDriver, PostgresDriverProvider};
pub use schema::CREATE_MIGRATION_HISTORY;
