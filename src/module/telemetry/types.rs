///! Record types for the telemetry API endpoints
///!
///! Raw types mirror the wire shape with defaulted fields; typed rows carry
///! the site attributes and display color joined in by serial.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::catalog::Rgb;
use crate::module::serial::{RawSerial, Serial};

/// Raw device object from `/sensor/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDevice {
    #[serde(default)]
    pub serial: Option<RawSerial>,
    #[serde(default)]
    pub online: bool,
    #[serde(rename = "type", default)]
    pub sensor_type: String,
    #[serde(default)]
    pub position: Option<RawPosition>,
    /// Registration timestamp, epoch seconds.
    #[serde(default)]
    pub added: Option<i64>,
    /// Last-contact timestamp, epoch seconds.
    #[serde(rename = "lastConnectionEvent", default)]
    pub last_connection_event: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// One sensor's current reported state, enriched with catalog attributes.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub serial: Serial,
    pub site: String,
    pub country: String,
    pub sensor_type: String,
    pub online: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub added: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub color: Rgb,
}

/// One message-rate sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSample {
    pub serial: Serial,
    pub ts: DateTime<Utc>,
    pub rate: f64,
}

/// Ordered (longitude, latitude) vertices for one serial on one day.
/// Empty when the source day has no recorded ranges.
pub type CoveragePolygon = Vec<(f64, f64)>;
