//! Unit tests for task executors and the task scheduler.

mod executor_tests;
