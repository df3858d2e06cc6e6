//! Unit tests for migration file name parsing.

use crate::ledger::domain::{LedgerDomainError, MigrationType, parse_migration_file_name};
use rstest::rstest;

#[rstest]
fn baseline_marker_selects_baseline_type() {
    let info = parse_migration_file_name("migrations/shop/0001__shop__baseline.sql")
        .expect("valid file name");

    assert_eq!(info.version().to_string(), "0001");
    assert_eq!(info.database(), "shop");
    assert_eq!(info.namespace().as_str(), "shop");
    assert_eq!(info.migration_type(), MigrationType::Baseline);
    assert_eq!(info.description(), "Create shop baseline");
}

#[rstest]
#[case("0002__shop__add_note_column.sql", "Add note column")]
#[case("0002__shop__add__note.sql", "Add note")]
#[case("0002__shop.sql", "Create shop schema migration")]
fn remaining_parts_become_the_description(#[case] name: &str, #[case] description: &str) {
    let info = parse_migration_file_name(name).expect("valid file name");
    assert_eq!(info.migration_type(), MigrationType::Migrate);
    assert_eq!(info.description(), description);
}

#[rstest]
fn baseline_with_description_keeps_the_description() {
    let info = parse_migration_file_name("0001__shop__baseline__initial_schema.sql")
        .expect("valid file name");
    assert_eq!(info.migration_type(), MigrationType::Baseline);
    assert_eq!(info.description(), "Initial schema");
}

#[rstest]
#[case("0001.sql")]
#[case("__shop.sql")]
#[case("0001__.sql")]
fn incomplete_names_are_rejected(#[case] name: &str) {
    assert!(matches!(
        parse_migration_file_name(name),
        Err(LedgerDomainError::InvalidFileName { .. })
    ));
}
