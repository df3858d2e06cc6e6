//! Ledger apply scenarios against [`InMemoryDriver`].
//!
//! [`InMemoryDriver`]: gropius::ledger::adapters::memory::InMemoryDriver

use crate::in_memory::helpers::{drivers, shop, shop_migration};
use gropius::error::ErrorCode;
use gropius::ledger::{
    adapters::memory::InMemoryDriverProvider,
    domain::{MigrationHistoryFind, MigrationType, Namespace},
    ports::{Driver, DriverError},
};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;

const ADD_NOTE: &str = "ALTER TABLE orders ADD COLUMN note TEXT";

fn rejection(err: &DriverError) -> String {
    format!("{:?}: {err}", err.code())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scripted_apply_sequence(drivers: InMemoryDriverProvider<DefaultClock>) -> eyre::Result<()> {
    let driver = shop(&drivers).await?;

    let baseline = driver
        .execute_migration(&shop_migration("0001", MigrationType::Baseline)?, "")
        .await?;
    eyre::ensure!(baseline.sequence == 1, "baseline sequence was {}", baseline.sequence);
    eyre::ensure!(baseline.migration_type == MigrationType::Baseline, "baseline type");

    let update = driver
        .execute_migration(&shop_migration("0002", MigrationType::Migrate)?, ADD_NOTE)
        .await?;
    eyre::ensure!(update.sequence == 2, "update sequence was {}", update.sequence);
    eyre::ensure!(
        driver.executed_statements()? == vec![ADD_NOTE.to_owned()],
        "only the update statement runs"
    );

    let duplicate = driver
        .execute_migration(&shop_migration("0002", MigrationType::Migrate)?, ADD_NOTE)
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("re-applying 0002 must fail"))?;
    eyre::ensure!(
        rejection(&duplicate) == "AlreadyApplied: shop has already applied version 0002",
        "unexpected rejection: {}",
        rejection(&duplicate)
    );

    let late = driver
        .execute_migration(&shop_migration("0001b", MigrationType::Migrate)?, ADD_NOTE)
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("0001b after 0002 must fail"))?;
    eyre::ensure!(
        rejection(&late)
            == "OutOfOrder: shop has already applied version 0002 which is higher than 0001b",
        "unexpected rejection: {}",
        rejection(&late)
    );

    let history = driver
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    let sequences: Vec<u64> = history.iter().map(|row| row.sequence).collect();
    eyre::ensure!(sequences == vec![2, 1], "history sequences were {sequences:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_without_baseline_is_rejected(
    drivers: InMemoryDriverProvider<DefaultClock>,
) -> eyre::Result<()> {
    let driver = shop(&drivers).await?;

    let err = driver
        .execute_migration(&shop_migration("0002", MigrationType::Migrate)?, ADD_NOTE)
        .await
        .err()
        .ok_or_else(|| eyre::eyre!("an update needs a baseline"))?;

    eyre::ensure!(err.code() == ErrorCode::NoBaseline, "code was {}", err.code());
    eyre::ensure!(driver.executed_statements()?.is_empty(), "nothing ran");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_statement_leaves_no_history(
    drivers: InMemoryDriverProvider<DefaultClock>,
) -> eyre::Result<()> {
    let driver = shop(&drivers).await?;
    driver
        .execute_migration(&shop_migration("0001", MigrationType::Baseline)?, "")
        .await?;
    driver.fail_statements_containing("orders")?;

    let outcome = driver
        .execute_migration(&shop_migration("0002", MigrationType::Migrate)?, ADD_NOTE)
        .await;

    eyre::ensure!(outcome.is_err(), "the statement must fail");
    let history = driver
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    eyre::ensure!(history.len() == 1, "only the baseline is recorded");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn racing_applies_record_one_row(
    drivers: InMemoryDriverProvider<DefaultClock>,
) -> eyre::Result<()> {
    let driver = Arc::new(shop(&drivers).await?);
    driver
        .execute_migration(&shop_migration("0001", MigrationType::Baseline)?, "")
        .await?;

    let mut racers = Vec::new();
    for _ in 0..8 {
        let racer = Arc::clone(&driver);
        let info = shop_migration("0002", MigrationType::Migrate)?;
        racers.push(tokio::spawn(async move {
            racer.execute_migration(&info, ADD_NOTE).await
        }));
    }
    let mut applied = 0;
    let mut rejected = 0;
    for racer in racers {
        match racer.await? {
            Ok(_) => applied += 1,
            Err(err) if err.code() == ErrorCode::AlreadyApplied => rejected += 1,
            Err(err) => return Err(err.into()),
        }
    }

    eyre::ensure!(applied == 1, "{applied} racers applied 0002");
    eyre::ensure!(rejected == 7, "{rejected} racers were rejected");
    let history = driver
        .find_migration_history_list(&MigrationHistoryFind::for_namespace(Namespace::new("shop")?))
        .await?;
    let sequences: Vec<u64> = history.iter().map(|row| row.sequence).collect();
    eyre::ensure!(sequences == vec![2, 1], "history sequences were {sequences:?}");
    Ok(())
}
