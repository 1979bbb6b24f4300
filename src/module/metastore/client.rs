///! Metadata-store client
///!
///! The secondary store is a PocketBase-style HTTP collection API holding
///! the sensor-details catalog and the append-only status history. Reads use
///! the admin token verbatim in the Authorization header (no bearer scheme).

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ApiError;
use crate::module::metastore::types::{
    NewStatusRecord, RawSensorDetail, RawStatusRecord, RecordPage, SensorDetail,
    StatusHistoryRecord,
};

pub const POCKETHOST_BASE: &str = "https://opdi.pockethost.io";
pub const DETAILS_COLLECTION: &str = "opensky_sensor_details";
pub const STATUS_COLLECTION: &str = "opensky_sensor_status";

const DETAILS_PAGE_SIZE: usize = 200;
/// Status history is capped at one page; truncation for very long lookback
/// windows is accepted rather than looping indefinitely.
const STATUS_PAGE_SIZE: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct MetastoreClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl MetastoreClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("skyfleet-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }

    fn require_token(&self) -> Result<(), ApiError> {
        if self.token.is_empty() {
            return Err(ApiError::Auth {
                detail: "metadata-store admin token is required".to_string(),
            });
        }
        Ok(())
    }

    /// Fetch every sensor-details record, walking pages until a short page.
    /// Rows with an unusable serial are silently excluded.
    pub async fn fetch_sensor_details(&self) -> Result<Vec<SensorDetail>, ApiError> {
        self.require_token()?;

        let url = self.records_url(DETAILS_COLLECTION);
        let mut page = 1u32;
        let mut rows: Vec<SensorDetail> = Vec::new();

        loop {
            let response = self
                .client
                .get(&url)
                .header("Authorization", &self.token)
                .query(&[
                    ("page", page.to_string()),
                    ("perPage", DETAILS_PAGE_SIZE.to_string()),
                    ("sort", "airport_icao,sensor_serial".to_string()),
                ])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, detail));
            }

            let payload: RecordPage<RawSensorDetail> = response.json().await?;
            let fetched = payload.items.len();
            rows.extend(payload.items.into_iter().filter_map(RawSensorDetail::normalize));

            if fetched < DETAILS_PAGE_SIZE {
                break;
            }
            page += 1;
        }

        tracing::debug!("Fetched {} sensor-details rows", rows.len());
        Ok(rows)
    }

    /// Fetch status history newer than `months` back, newest first.
    ///
    /// Filters server-side on the computed lower bound and reads a single
    /// capped page.
    pub async fn fetch_status_history(
        &self,
        months: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusHistoryRecord>, ApiError> {
        self.require_token()?;

        let filter = status_filter(status_lower_bound(now, months));
        let url = format!(
            "{}?page=1&perPage={}&sort=-polling_time&filter={}",
            self.records_url(STATUS_COLLECTION),
            STATUS_PAGE_SIZE,
            urlencoding::encode(&filter),
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, detail));
        }

        let payload: RecordPage<RawStatusRecord> = response.json().await?;
        let rows: Vec<StatusHistoryRecord> = payload
            .items
            .into_iter()
            .filter_map(RawStatusRecord::normalize)
            .collect();
        tracing::debug!("Fetched {} status-history rows", rows.len());
        Ok(rows)
    }

    /// Append one status record to the status collection.
    pub async fn append_status(&self, record: &NewStatusRecord) -> Result<(), ApiError> {
        self.require_token()?;

        let response = self
            .client
            .post(self.records_url(STATUS_COLLECTION))
            .header("Authorization", &self.token)
            .json(record)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, detail));
        }
        Ok(())
    }
}

/// Lookback lower bound: `months` of 30 days each before `now`.
pub fn status_lower_bound(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now - chrono::Duration::days(30 * i64::from(months))
}

fn status_filter(lower_bound: DateTime<Utc>) -> String {
    format!(
        "polling_time >= \"{}\"",
        lower_bound.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
