///! Aggregation façade
///!
///! `FleetService` owns the token manager, the telemetry and metadata-store
///! clients, the request log, the site catalog, and one TTL cache per
///! expensive query. Every cached operation takes a [`CacheBust`] marker as
///! its last argument; callers pass `CacheBust::stable()` normally and mint
///! one fresh value per user-triggered refresh pass.
///!
///! Error policy: each operation either returns its (possibly empty) result
///! or a typed [`ApiError`]. A failure in one operation never aborts the
///! rest of a pass; callers degrade that section only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::module::cache::{CacheBust, Clock, SystemClock, TtlCache};
use crate::module::catalog::SiteCatalog;
use crate::module::metastore::types::{NewStatusRecord, StatusHistoryRecord};
use crate::module::metastore::MetastoreClient;
use crate::module::serial::Serial;
use crate::module::telemetry::transform;
use crate::module::telemetry::types::{CoveragePolygon, DeviceRecord, RateSample};
use crate::module::telemetry::{
    LogRequests, RequestLog, TelemetryClient, TelemetryFetch, TokenManager,
};

const DEVICE_LIST_TTL: Duration = Duration::from_secs(300);
const RATES_TTL: Duration = Duration::from_secs(300);
const COVERAGE_TTL: Duration = Duration::from_secs(600);
const STATUS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceListKey {
    token: String,
    bust: CacheBust,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RatesKey {
    token: String,
    serials: Vec<Serial>,
    hours: u32,
    bust: CacheBust,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CoverageKey {
    token: String,
    serial: Serial,
    day: String,
    bust: CacheBust,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatusKey {
    months: u32,
    bust: CacheBust,
}

pub struct FleetService<F = TelemetryClient> {
    tokens: TokenManager,
    telemetry: F,
    metastore: MetastoreClient,
    log: RequestLog,
    catalog: RwLock<SiteCatalog>,
    clock: Arc<dyn Clock>,
    device_cache: TtlCache<DeviceListKey, Vec<DeviceRecord>>,
    rates_cache: TtlCache<RatesKey, Vec<RateSample>>,
    coverage_cache: TtlCache<CoverageKey, CoveragePolygon>,
    status_cache: TtlCache<StatusKey, Vec<StatusHistoryRecord>>,
}

impl FleetService {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BackendConfig, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let log = RequestLog::new();
        Ok(Self {
            tokens: TokenManager::with_clock(
                config.auth_url.as_str(),
                config.client_id.as_str(),
                config.client_secret.as_str(),
                clock.clone(),
            )?,
            telemetry: TelemetryClient::new(config.api_url.as_str(), log.clone())?,
            metastore: MetastoreClient::new(
                config.metastore_url.as_str(),
                config.metastore_token.as_str(),
            )?,
            log,
            catalog: RwLock::new(SiteCatalog::default()),
            device_cache: TtlCache::new(DEVICE_LIST_TTL, clock.clone()),
            rates_cache: TtlCache::new(RATES_TTL, clock.clone()),
            coverage_cache: TtlCache::new(COVERAGE_TTL, clock.clone()),
            status_cache: TtlCache::new(STATUS_TTL, clock.clone()),
            clock,
        })
    }
}

impl<F: TelemetryFetch> FleetService<F> {
    /// Fetch the sensor-details collection and rebuild the catalog.
    /// Returns a snapshot of the rebuilt catalog.
    pub async fn load_catalog(&self) -> Result<SiteCatalog, ApiError> {
        let details = self.metastore.fetch_sensor_details().await?;
        let catalog = SiteCatalog::build(&details);
        tracing::info!(
            "Catalog rebuilt: {} serials across {} sites",
            catalog.all_serials.len(),
            catalog.monitor_sites.len()
        );
        *self.catalog.write().await = catalog.clone();
        Ok(catalog)
    }

    /// Current catalog snapshot (empty until `load_catalog` succeeds).
    pub async fn catalog(&self) -> SiteCatalog {
        self.catalog.read().await.clone()
    }

    /// Bearer token for the current pass; cached until its proactive expiry.
    pub async fn get_token(&self) -> Result<String, ApiError> {
        self.tokens.get_token().await
    }

    /// Force a fresh token exchange (the 401 recovery path).
    pub async fn refresh_token(&self) -> Result<String, ApiError> {
        self.tokens.refresh().await
    }

    /// Device list, filtered to the catalog's known serials and enriched
    /// with site attributes and display color. Empty upstream data is an
    /// empty list, not an error.
    pub async fn device_list(
        &self,
        token: &str,
        bust: &CacheBust,
    ) -> Result<Vec<DeviceRecord>, ApiError> {
        let key = DeviceListKey {
            token: token.to_string(),
            bust: bust.clone(),
        };
        if let Some(rows) = self.device_cache.get(&key).await {
            return Ok(rows);
        }

        let payload = self
            .telemetry
            .get("/sensor/list", token, &[], LogRequests::Record)
            .await?;
        let catalog = self.catalog.read().await;
        let rows = transform::parse_device_list(&payload, &catalog);
        drop(catalog);

        self.device_cache.insert(key, rows.clone()).await;
        Ok(rows)
    }

    /// Message-rate samples for the given serials over the trailing window.
    ///
    /// The endpoint is known to sometimes reject custom time ranges, so the
    /// request runs through an ordered list of parameter variants: first
    /// with `begin`/`end`, then once more with serials only. After the
    /// second failure the error propagates.
    ///
    /// Bulk passes over the whole fleet pass [`LogRequests::Suppress`], as
    /// with [`Self::coverage_polygons`].
    pub async fn message_rates(
        &self,
        token: &str,
        serials: &[Serial],
        hours: u32,
        bust: &CacheBust,
        log: LogRequests,
    ) -> Result<Vec<RateSample>, ApiError> {
        if serials.is_empty() {
            return Ok(Vec::new());
        }
        let key = RatesKey {
            token: token.to_string(),
            serials: serials.to_vec(),
            hours,
            bust: bust.clone(),
        };
        if let Some(rows) = self.rates_cache.get(&key).await {
            return Ok(rows);
        }

        let variants = rate_param_variants(serials, hours, self.clock.now());
        let mut last_err: Option<ApiError> = None;
        for params in &variants {
            if let Some(err) = &last_err {
                tracing::warn!(
                    "msg-rates request failed ({}), retrying with reduced parameters",
                    err
                );
            }
            match self
                .telemetry
                .get("/stats/msg-rates", token, params, log)
                .await
            {
                Ok(payload) => {
                    let rows = transform::flatten_rate_series(&payload);
                    self.rates_cache.insert(key, rows.clone()).await;
                    return Ok(rows);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("at least one parameter variant is always attempted"))
    }

    /// Coverage polygon for one serial on one calendar day (`YYYYMMDD`).
    /// An absent or empty day yields an empty polygon.
    pub async fn coverage_polygon(
        &self,
        token: &str,
        serial: Serial,
        day: &str,
        bust: &CacheBust,
    ) -> Result<CoveragePolygon, ApiError> {
        self.coverage_polygon_inner(token, serial, day, bust, LogRequests::Record)
            .await
    }

    async fn coverage_polygon_inner(
        &self,
        token: &str,
        serial: Serial,
        day: &str,
        bust: &CacheBust,
        log: LogRequests,
    ) -> Result<CoveragePolygon, ApiError> {
        let key = CoverageKey {
            token: token.to_string(),
            serial,
            day: day.to_string(),
            bust: bust.clone(),
        };
        if let Some(polygon) = self.coverage_cache.get(&key).await {
            return Ok(polygon);
        }

        let params = vec![
            ("days".to_string(), day.to_string()),
            ("serials".to_string(), serial.to_string()),
        ];
        let payload = self.telemetry.get("/range/days", token, &params, log).await?;
        let polygon = transform::extract_coverage_polygon(&payload, day);

        self.coverage_cache.insert(key, polygon.clone()).await;
        Ok(polygon)
    }

    /// Coverage polygons for a whole serial set: one sequential round-trip
    /// per serial, request logging suppressed, each serial's failure
    /// reported independently so one bad sensor never sinks the map.
    pub async fn coverage_polygons(
        &self,
        token: &str,
        serials: &[Serial],
        day: &str,
        bust: &CacheBust,
    ) -> Vec<(Serial, Result<CoveragePolygon, ApiError>)> {
        let mut results = Vec::with_capacity(serials.len());
        for &serial in serials {
            let result = self
                .coverage_polygon_inner(token, serial, day, bust, LogRequests::Suppress)
                .await;
            if let Err(err) = &result {
                tracing::warn!("Coverage unavailable for {}: {}", serial, err);
            }
            results.push((serial, result));
        }
        results
    }

    /// Status history for the lookback window, newest first. Single capped
    /// page from the store; truncation for long windows is accepted.
    pub async fn status_history(
        &self,
        months: u32,
        bust: &CacheBust,
    ) -> Result<Vec<StatusHistoryRecord>, ApiError> {
        let key = StatusKey {
            months,
            bust: bust.clone(),
        };
        if let Some(rows) = self.status_cache.get(&key).await {
            return Ok(rows);
        }

        let rows = self
            .metastore
            .fetch_status_history(months, self.clock.now())
            .await?;
        self.status_cache.insert(key, rows.clone()).await;
        Ok(rows)
    }

    /// Append one polled status record to the store (used by the poller).
    pub async fn append_status(&self, record: &NewStatusRecord) -> Result<(), ApiError> {
        self.metastore.append_status(record).await
    }

    /// Read-only access to the session request log.
    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }
}

/// Ordered parameter variants for the message-rate request: the full window
/// first, then the serials-only fallback. Exactly two attempts, never more.
fn rate_param_variants(
    serials: &[Serial],
    hours: u32,
    now: DateTime<Utc>,
) -> Vec<Vec<(String, String)>> {
    let csv = serials
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let end = now.timestamp();
    let begin = end - i64::from(hours) * 3600;
    vec![
        vec![
            ("serials".to_string(), csv.clone()),
            ("begin".to_string(), begin.to_string()),
            ("end".to_string(), end.to_string()),
        ],
        vec![("serials".to_string(), csv)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::cache::test_clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 27, 12, 0, 0).unwrap()
    }

    /// Offline stand-in for the telemetry API: counts calls, records the
    /// parameters and log choice of each one, and can fail the first N
    /// attempts before answering with a fixed payload.
    struct ScriptedFetch {
        payload: Value,
        fail_first: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<(Vec<(String, String)>, LogRequests)>>,
    }

    impl ScriptedFetch {
        fn returning(payload: Value) -> Self {
            Self::failing_first(0, payload)
        }

        fn failing_first(fail_first: usize, payload: Value) -> Self {
            Self {
                payload,
                fail_first,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TelemetryFetch for ScriptedFetch {
        async fn get(
            &self,
            _path: &str,
            _token: &str,
            params: &[(String, String)],
            log: LogRequests,
        ) -> Result<Value, ApiError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((params.to_vec(), log));
            if attempt < self.fail_first {
                return Err(ApiError::Http {
                    status: 400,
                    detail: "bad time range".to_string(),
                });
            }
            Ok(self.payload.clone())
        }
    }

    fn offline_service<F: TelemetryFetch>(
        telemetry: F,
        clock: Arc<ManualClock>,
    ) -> FleetService<F> {
        let config = BackendConfig::default();
        FleetService {
            tokens: TokenManager::with_clock(config.auth_url.as_str(), "", "", clock.clone())
                .unwrap(),
            telemetry,
            metastore: MetastoreClient::new(config.metastore_url.as_str(), "").unwrap(),
            log: RequestLog::new(),
            catalog: RwLock::new(SiteCatalog::default()),
            device_cache: TtlCache::new(DEVICE_LIST_TTL, clock.clone()),
            rates_cache: TtlCache::new(RATES_TTL, clock.clone()),
            coverage_cache: TtlCache::new(COVERAGE_TTL, clock.clone()),
            status_cache: TtlCache::new(STATUS_TTL, clock.clone()),
            clock,
        }
    }

    fn rates_payload() -> Value {
        json!({"series": {"123": [[1_700_000_000_000i64, 4.5]]}})
    }

    #[tokio::test]
    async fn test_warm_rates_cache_serves_without_refetch() {
        let clock = ManualClock::starting_at(epoch());
        let service = offline_service(ScriptedFetch::returning(rates_payload()), clock.clone());
        let bust = CacheBust::stable();

        let first = service
            .message_rates("tok", &[123], 24, &bust, LogRequests::Record)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(service.telemetry.calls(), 1);

        // Same arguments, same bust, within the TTL: served from cache.
        let second = service
            .message_rates("tok", &[123], 24, &bust, LogRequests::Record)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(service.telemetry.calls(), 1);

        // Past the TTL the next call goes upstream again.
        clock.advance(chrono::Duration::seconds(300));
        service
            .message_rates("tok", &[123], 24, &bust, LogRequests::Record)
            .await
            .unwrap();
        assert_eq!(service.telemetry.calls(), 2);

        // A fresh bust value misses even on a warm cache.
        let forced = CacheBust::fresh(clock.now());
        service
            .message_rates("tok", &[123], 24, &forced, LogRequests::Record)
            .await
            .unwrap();
        assert_eq!(service.telemetry.calls(), 3);
    }

    #[tokio::test]
    async fn test_warm_device_cache_serves_without_refetch() {
        let clock = ManualClock::starting_at(epoch());
        let service = offline_service(ScriptedFetch::returning(json!([])), clock.clone());
        let bust = CacheBust::stable();

        service.device_list("tok", &bust).await.unwrap();
        service.device_list("tok", &bust).await.unwrap();
        assert_eq!(service.telemetry.calls(), 1);

        let forced = CacheBust::fresh(clock.now());
        service.device_list("tok", &forced).await.unwrap();
        assert_eq!(service.telemetry.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_fallback_retries_once_with_serials_only() {
        let clock = ManualClock::starting_at(epoch());
        let service =
            offline_service(ScriptedFetch::failing_first(1, rates_payload()), clock);

        let rows = service
            .message_rates("tok", &[123], 6, &CacheBust::stable(), LogRequests::Record)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(service.telemetry.calls(), 2);

        let seen = service.telemetry.seen.lock().unwrap();
        // First attempt carries the full window, the retry only the serials.
        assert_eq!(seen[0].0.len(), 3);
        assert_eq!(seen[1].0, vec![("serials".to_string(), "123".to_string())]);
    }

    #[tokio::test]
    async fn test_rate_fallback_stops_after_second_failure() {
        let clock = ManualClock::starting_at(epoch());
        let service =
            offline_service(ScriptedFetch::failing_first(2, rates_payload()), clock);

        let result = service
            .message_rates("tok", &[123], 6, &CacheBust::stable(), LogRequests::Record)
            .await;
        assert!(matches!(result, Err(ApiError::Http { status: 400, .. })));
        // Exactly two attempts, never a third.
        assert_eq!(service.telemetry.calls(), 2);
    }

    #[tokio::test]
    async fn test_rates_log_choice_reaches_every_attempt() {
        let clock = ManualClock::starting_at(epoch());
        let service =
            offline_service(ScriptedFetch::failing_first(1, rates_payload()), clock);

        service
            .message_rates("tok", &[123], 6, &CacheBust::stable(), LogRequests::Suppress)
            .await
            .unwrap();

        let seen = service.telemetry.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, log)| *log == LogRequests::Suppress));
    }

    #[test]
    fn test_rate_param_variants_exactly_two() {
        let now = Utc.with_ymd_and_hms(2026, 8, 27, 12, 0, 0).unwrap();
        let variants = rate_param_variants(&[123, -456], 24, now);
        assert_eq!(variants.len(), 2);

        let full = &variants[0];
        assert_eq!(full[0], ("serials".to_string(), "123,-456".to_string()));
        let begin: i64 = full[1].1.parse().unwrap();
        let end: i64 = full[2].1.parse().unwrap();
        assert_eq!(end, now.timestamp());
        assert_eq!(end - begin, 24 * 3600);

        let fallback = &variants[1];
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0], ("serials".to_string(), "123,-456".to_string()));
    }

    #[test]
    fn test_cache_keys_distinguish_arguments() {
        let a = RatesKey {
            token: "t".to_string(),
            serials: vec![1, 2],
            hours: 24,
            bust: CacheBust::stable(),
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.hours = 48;
        assert_ne!(a, b);
        let mut c = a.clone();
        c.bust = CacheBust::fresh(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_ne!(a, c);
        let mut d = a.clone();
        d.serials = vec![2, 1];
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn test_empty_serial_list_short_circuits() {
        let config = BackendConfig::default();
        let service = FleetService::new(&config).unwrap();
        let rows = service
            .message_rates("token", &[], 24, &CacheBust::stable(), LogRequests::Record)
            .await
            .unwrap();
        assert!(rows.is_empty());
        // No request was issued, so nothing was logged.
        assert_eq!(service.request_log().len().await, 0);
    }
}
