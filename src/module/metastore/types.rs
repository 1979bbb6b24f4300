///! Record types for the metadata-store collections
///!
///! The store is a PocketBase-style HTTP collection API. Raw types mirror
///! the wire shape with every field defaulted, so one sparse record never
///! fails a page; `normalize()` is the only way a raw row becomes a typed
///! one, and rows with an unusable serial are dropped there.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::module::serial::{RawSerial, Serial};

/// One page of a paginated collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Raw row of the sensor-details collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSensorDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub airport_icao: Option<String>,
    #[serde(default)]
    pub airport_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_iso3: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub sensor_serial: Option<RawSerial>,
}

impl RawSensorDetail {
    /// Normalize into a typed row; `None` when the serial is unusable.
    pub fn normalize(self) -> Option<SensorDetail> {
        let serial = self.sensor_serial.as_ref()?.normalize()?;
        Some(SensorDetail {
            id: self.id,
            serial,
            icao: self.airport_icao.unwrap_or_default().to_uppercase(),
            airport: self.airport_name.unwrap_or_default(),
            country_name: self.country_name.unwrap_or_default(),
            country_iso3: self.country_iso3.unwrap_or_default().to_uppercase(),
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

/// Normalized sensor-details row; input to the catalog builder.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDetail {
    pub id: String,
    pub serial: Serial,
    pub icao: String,
    pub airport: String,
    pub country_name: String,
    pub country_iso3: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Raw row of the sensor-status collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStatusRecord {
    #[serde(default)]
    pub sensor_serial: Option<RawSerial>,
    #[serde(default)]
    pub sensor_site_airport_icao: Option<String>,
    #[serde(default)]
    pub sensor_site_airport_name: Option<String>,
    #[serde(default)]
    pub sensor_site_country_name: Option<String>,
    #[serde(default)]
    pub sensor_site_country_iso3: Option<String>,
    #[serde(default)]
    pub polling_time: Option<String>,
    #[serde(default)]
    pub sensor_online: bool,
}

impl RawStatusRecord {
    /// Normalize into a typed row; `None` when the serial or timestamp is
    /// unusable.
    pub fn normalize(self) -> Option<StatusHistoryRecord> {
        let serial = self.sensor_serial.as_ref()?.normalize()?;
        let polling_time = parse_polling_time(self.polling_time.as_deref()?)?;
        Some(StatusHistoryRecord {
            serial,
            icao: self.sensor_site_airport_icao.unwrap_or_default(),
            airport: self.sensor_site_airport_name.unwrap_or_default(),
            country_name: self.sensor_site_country_name.unwrap_or_default(),
            country_iso3: self.sensor_site_country_iso3.unwrap_or_default(),
            polling_time,
            online: self.sensor_online,
        })
    }
}

/// One polled status observation for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusHistoryRecord {
    pub serial: Serial,
    pub icao: String,
    pub airport: String,
    pub country_name: String,
    pub country_iso3: String,
    pub polling_time: DateTime<Utc>,
    pub online: bool,
}

/// Status record to append to the store (the poller's output shape).
#[derive(Debug, Clone, Serialize)]
pub struct NewStatusRecord {
    pub sensor_site_airport_icao: String,
    pub sensor_site_airport_name: String,
    pub sensor_site_country_name: String,
    pub sensor_site_country_iso3: String,
    pub sensor_serial: Serial,
    pub polling_time: String,
    pub sensor_online: bool,
}

impl NewStatusRecord {
    pub fn new(
        serial: Serial,
        site: Option<&crate::module::catalog::SiteInfo>,
        online: bool,
        polled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_site_airport_icao: site.map(|s| s.icao.clone()).unwrap_or_default(),
            sensor_site_airport_name: site.map(|s| s.airport.clone()).unwrap_or_default(),
            sensor_site_country_name: site.map(|s| s.country_name.clone()).unwrap_or_default(),
            sensor_site_country_iso3: site.map(|s| s.country_iso3.clone()).unwrap_or_default(),
            sensor_serial: serial,
            polling_time: polled_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            sensor_online: online,
        }
    }
}

/// Parse the store's RFC3339 `polling_time` (with or without the `Z`).
fn parse_polling_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
