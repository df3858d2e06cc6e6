//! Shared helpers for in-memory integration tests.

use gropius::engine::Engine;
use gropius::ledger::{
    adapters::memory::{InMemoryDriver, InMemoryDriverProvider},
    domain::{MigrationInfo, MigrationType, MigrationVersion},
    ports::ConnectionTarget,
};
use mockable::DefaultClock;
use rstest::fixture;
use std::sync::Arc;

/// Instance every ledger scenario targets.
pub const INSTANCE: &str = "i1";

/// Provides a fresh in-memory driver provider for each test.
#[fixture]
pub fn drivers() -> InMemoryDriverProvider<DefaultClock> {
    InMemoryDriverProvider::new(Arc::new(DefaultClock))
}

/// Returns the driver for the `shop` database, with its history table set up.
///
/// # Errors
///
/// Returns an error when the driver cannot be opened or set up.
pub async fn shop(
    drivers: &InMemoryDriverProvider<DefaultClock>,
) -> eyre::Result<InMemoryDriver<DefaultClock>> {
    use gropius::ledger::ports::Driver;

    let driver = drivers.driver(&ConnectionTarget::database(INSTANCE, Engine::Postgres, "shop"))?;
    driver.setup_migration_if_needed().await?;
    Ok(driver)
}

/// Builds migration metadata for the `shop` namespace.
///
/// # Errors
///
/// Returns an error for a blank version.
pub fn shop_migration(version: &str, migration_type: MigrationType) -> eyre::Result<MigrationInfo> {
    Ok(MigrationInfo::new(
        "shop",
        MigrationVersion::plain(version)?,
        migration_type,
    )?)
}
