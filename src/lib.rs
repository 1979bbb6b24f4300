///! Aggregation and caching core for a sensor-fleet dashboard.
///!
///! Polls the telemetry API (device list, message rates, coverage ranges)
///! and the secondary metadata store, reconciles inconsistently-typed serial
///! identifiers into one canonical key space, and serves merged, typed rows
///! to a presentation layer under per-query TTL caching with explicit
///! cache-bust support.

pub mod config;
pub mod error;
pub mod logging;
pub mod module;
pub mod service;

pub use config::BackendConfig;
pub use error::ApiError;
pub use service::FleetService;
