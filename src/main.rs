///! skyfleet-poller: scheduled status-poll run.
///!
///! Builds the catalog from the metadata store, fetches the live device list
///! once, then appends one status record per known serial back to the
///! store's status collection. Per-record append failures are logged and
///! counted without aborting the run.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use skyfleet_backend::config::BackendConfig;
use skyfleet_backend::logging;
use skyfleet_backend::module::cache::CacheBust;
use skyfleet_backend::module::metastore::NewStatusRecord;
use skyfleet_backend::module::serial::Serial;
use skyfleet_backend::module::telemetry::DeviceRecord;
use skyfleet_backend::service::FleetService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = BackendConfig::from_env()?;
    let _logging_guard = logging::init_logging("logs", "skyfleet-poller", &config.log_level);

    if !config.has_telemetry_credentials() {
        bail!("Set OPENSKY_CLIENT_ID and OPENSKY_CLIENT_SECRET to continue");
    }
    if !config.has_metastore_token() {
        bail!("Set POCKETHOST_ADMIN_TOKEN to continue");
    }

    let service = FleetService::new(&config).context("Failed to build fleet service")?;

    let catalog = service
        .load_catalog()
        .await
        .context("Failed to fetch sensor metadata")?;
    if catalog.is_empty() {
        bail!("No sensor metadata found in the metadata store");
    }
    tracing::info!(
        "Polling {} serials across {} sites",
        catalog.all_serials.len(),
        catalog.monitor_sites.len()
    );

    let token = service
        .get_token()
        .await
        .context("Failed to obtain bearer token")?;

    // One poll run is one refresh pass: a single fresh bust value for every
    // call in it.
    let bust = CacheBust::fresh(Utc::now());
    let devices = service
        .device_list(&token, &bust)
        .await
        .context("Failed to fetch device list")?;
    let by_serial: HashMap<Serial, &DeviceRecord> =
        devices.iter().map(|d| (d.serial, d)).collect();

    let polled_at = Utc::now();
    let mut appended = 0usize;
    let mut failed = 0usize;

    for &serial in &catalog.all_serials {
        let online = by_serial.get(&serial).map(|d| d.online).unwrap_or(false);
        let record = NewStatusRecord::new(serial, catalog.site(serial), online, polled_at);
        match service.append_status(&record).await {
            Ok(()) => {
                tracing::info!(
                    "Posted {} ({}) online={}",
                    serial,
                    catalog.site_label(serial).unwrap_or("?"),
                    online
                );
                appended += 1;
            }
            Err(e) => {
                tracing::error!("Failed to post status for {}: {}", serial, e);
                failed += 1;
            }
        }
    }

    tracing::info!("Poll run complete: {} appended, {} failed", appended, failed);
    if appended == 0 && failed > 0 {
        bail!("Every status append failed ({failed} records)");
    }
    Ok(())
}
