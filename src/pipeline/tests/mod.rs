//! Unit tests for the pipeline state model and status service.
