///! Payload transformers for the telemetry endpoints
///!
///! Raw JSON in, typed rows out. Keys and serials are routed through the
///! normalizer; unparseable keys and malformed entries are dropped rather
///! than failing the whole series. Absent or empty nesting yields an empty
///! result, not an error.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::module::catalog::SiteCatalog;
use crate::module::serial::{normalize_serial, Serial};
use crate::module::telemetry::types::{CoveragePolygon, DeviceRecord, RateSample, RawDevice};

/// Day-string format expected by the coverage endpoint.
pub fn coverage_day(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse the `/sensor/list` payload into enriched device rows.
///
/// Devices whose serial fails normalization or is outside the catalog's
/// known serial set are dropped. Site label, country, and display color are
/// joined in by serial; position falls back to the site coordinates only in
/// the consumer, not here.
pub fn parse_device_list(payload: &Value, catalog: &SiteCatalog) -> Vec<DeviceRecord> {
    let raw: Vec<RawDevice> = match serde_json::from_value(payload.clone()) {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Unexpected /sensor/list payload shape: {}", e);
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter_map(|device| {
            let serial = device.serial.as_ref()?.normalize()?;
            let site = catalog.site(serial)?;
            let (latitude, longitude) = device
                .position
                .as_ref()
                .map(|p| (p.latitude, p.longitude))
                .unwrap_or((None, None));
            Some(DeviceRecord {
                serial,
                site: site.label.clone(),
                country: site.country_name.clone(),
                sensor_type: device.sensor_type,
                online: device.online,
                latitude,
                longitude,
                added: device.added.and_then(epoch_seconds),
                last_seen: device.last_connection_event.and_then(epoch_seconds),
                color: catalog.color(serial),
            })
        })
        .collect()
}

/// Flatten the `/stats/msg-rates` payload into rate samples.
///
/// Source shape: `{"series": {"<serial>": [[epoch_ms, rate], ...], ...}}`.
/// One row per source sample, no aggregation or downsampling; rows come back
/// ordered by timestamp, ready for charting. Duplicate timestamps across
/// overlapping windows are kept.
pub fn flatten_rate_series(payload: &Value) -> Vec<RateSample> {
    let series = match payload.get("series").and_then(Value::as_object) {
        Some(series) => series,
        None => return Vec::new(),
    };

    let mut rows: Vec<RateSample> = Vec::new();
    for (key, samples) in series {
        let serial: Serial = match normalize_serial(key) {
            Some(serial) => serial,
            None => continue,
        };
        let samples = match samples.as_array() {
            Some(samples) => samples,
            None => continue,
        };
        for sample in samples {
            let pair = match sample.as_array() {
                Some(pair) if pair.len() >= 2 => pair,
                _ => continue,
            };
            let ts = match pair[0].as_i64().and_then(epoch_millis) {
                Some(ts) => ts,
                None => continue,
            };
            let rate = match pair[1].as_f64() {
                Some(rate) => rate,
                None => continue,
            };
            rows.push(RateSample { serial, ts, rate });
        }
    }

    rows.sort_by_key(|row| row.ts);
    rows
}

/// Extract the coverage polygon for one day from the `/range/days` payload.
///
/// Source shape: `{"<day>": [{"ranges": [[distance, lat, lon], ...]}]}`.
/// The distance component is discarded and the remaining pair reordered to
/// (lon, lat) for direct plotting.
pub fn extract_coverage_polygon(payload: &Value, day: &str) -> CoveragePolygon {
    let ranges = payload
        .get(day)
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("ranges"))
        .and_then(Value::as_array);

    let ranges = match ranges {
        Some(ranges) => ranges,
        None => return Vec::new(),
    };

    ranges
        .iter()
        .filter_map(|triple| {
            let triple = triple.as_array()?;
            if triple.len() < 3 {
                return None;
            }
            let lat = triple[1].as_f64()?;
            let lon = triple[2].as_f64()?;
            Some((lon, lat))
        })
        .collect()
}

fn epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
