//! Adapter implementations for pipeline ports.

pub mod memory;
