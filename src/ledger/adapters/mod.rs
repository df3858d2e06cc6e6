//! Adapter implementations for the ledger driver port.

pub mod memory;
pub mod postgres;
