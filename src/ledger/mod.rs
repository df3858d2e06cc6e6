//! Migration ledger: exactly-once, version-ordered application of schema and
//! data changes.
//!
//! A change is applied through [`ports::Driver::execute_migration`], which
//! runs [`protocol::apply_migration`] inside one transaction: the statement
//! and its history row commit together or not at all.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
mod error;
pub mod ports;
pub mod protocol;

pub use error::{LedgerError, LedgerResult};

#[cfg(test)]
mod tests;
