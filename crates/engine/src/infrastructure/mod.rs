//! Infrastructure - ports and the adapters the engine ships with.

pub mod clock;
pub mod config;
pub mod ports;
pub mod snapshot_store;
pub mod telemetry;
