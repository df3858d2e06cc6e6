//! Port contracts for the migration ledger.

pub mod driver;

pub use driver::{ConnectionTarget, Driver, DriverError, DriverProvider, DriverResult};

#[cfg(test)]
pub use driver::MockDriver;
