///! Telemetry API access: token management, authenticated GETs, and the
///! per-endpoint payload transformers.

pub mod client;
pub mod token;
pub mod transform;
pub mod types;

pub use client::{
    LogRequests, RequestLog, RequestLogEntry, TelemetryClient, TelemetryFetch, BASE_API_URL,
};
pub use token::{TokenManager, AUTH_URL};
pub use types::{CoveragePolygon, DeviceRecord, RateSample};
