//! Unit tests for check executors and the check scheduler.

mod scheduler_tests;
