//! Unit tests for the migration ledger.

mod file_name_tests;
