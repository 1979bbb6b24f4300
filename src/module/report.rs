///! Offline-window reporting over status history
///!
///! Pure selection and rendering: sensors whose newest status record is
///! offline with a polling time between 24 and 48 hours ago. Records older
///! than 48 hours are skipped so the same outage is not reported twice.
///! Delivery of the rendered report is outside this crate.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::module::metastore::types::StatusHistoryRecord;
use crate::module::serial::Serial;

/// One sensor selected by the offline window.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineSensor {
    pub serial: Serial,
    pub icao: String,
    pub airport: String,
    pub country: String,
    pub last_status: DateTime<Utc>,
}

/// Keep the newest record per serial. Input is expected newest-first (the
/// store sorts by `-polling_time`); the first occurrence wins.
pub fn latest_status_per_serial(
    records: &[StatusHistoryRecord],
) -> HashMap<Serial, &StatusHistoryRecord> {
    let mut latest: HashMap<Serial, &StatusHistoryRecord> = HashMap::new();
    for record in records {
        latest.entry(record.serial).or_insert(record);
    }
    latest
}

/// Select sensors whose latest status is offline with a polling time in the
/// (48h, 24h] window before `now`: older than 24 hours, but not yet past the
/// 48-hour cutoff.
pub fn collect_offline(records: &[StatusHistoryRecord], now: DateTime<Utc>) -> Vec<OfflineSensor> {
    let threshold_24 = now - Duration::hours(24);
    let threshold_48 = now - Duration::hours(48);

    let mut offline: Vec<OfflineSensor> = latest_status_per_serial(records)
        .into_values()
        .filter(|record| !record.online)
        .filter(|record| record.polling_time > threshold_48)
        .filter(|record| record.polling_time <= threshold_24)
        .map(|record| OfflineSensor {
            serial: record.serial,
            icao: record.icao.clone(),
            airport: record.airport.clone(),
            country: record.country_name.clone(),
            last_status: record.polling_time,
        })
        .collect();

    offline.sort_by(|a, b| (&a.icao, a.serial).cmp(&(&b.icao, b.serial)));
    offline
}

/// Render the report block; empty string when nothing is selected.
pub fn build_report(offline: &[OfflineSensor]) -> String {
    if offline.is_empty() {
        return String::new();
    }
    let mut lines = vec!["Sensors offline between 24-48h:".to_string()];
    for entry in offline {
        lines.push(format!(
            "- {} | {} {} ({}) | last offline status: {}",
            entry.serial,
            entry.icao,
            entry.airport,
            entry.country,
            entry.last_status.format("%Y-%m-%d %H:%M:%S UTC"),
        ));
    }
    lines.join("\n")
}
