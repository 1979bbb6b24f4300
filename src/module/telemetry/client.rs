///! Authenticated GET wrapper for the telemetry API
///!
///! Classifies responses (success / auth failure / other failure) and keeps
///! an optional process-wide request log for the observability panel. No
///! schema validation happens here; payloads are returned as raw JSON and
///! malformed shapes surface in the consuming transformer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ApiError;

pub const BASE_API_URL: &str = "https://opensky-network.org/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a call should append to the request log. Bulk loops (one call per
/// serial in the fleet) suppress logging to avoid flooding the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRequests {
    Record,
    Suppress,
}

/// One logged API request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub status: u16,
}

/// Append-only session log of API requests. Cleared only by the caller
/// (e.g. on an explicit refresh action), never by this layer.
#[derive(Clone, Default)]
pub struct RequestLog {
    entries: Arc<RwLock<Vec<RequestLogEntry>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, entry: RequestLogEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn snapshot(&self) -> Vec<RequestLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Fetch seam for the telemetry API. [`TelemetryClient`] is the production
/// implementation; tests substitute doubles that answer offline.
#[async_trait]
pub trait TelemetryFetch: Send + Sync {
    async fn get(
        &self,
        path: &str,
        token: &str,
        params: &[(String, String)],
        log: LogRequests,
    ) -> Result<Value, ApiError>;
}

/// HTTP GET client bound to a fixed API origin.
pub struct TelemetryClient {
    client: reqwest::Client,
    base_url: String,
    log: RequestLog,
}

impl TelemetryClient {
    pub fn new(base_url: impl Into<String>, log: RequestLog) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("skyfleet-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            log,
        })
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.log
    }
}

#[async_trait]
impl TelemetryFetch for TelemetryClient {
    /// Issue an authenticated GET and return the parsed JSON payload.
    ///
    /// 401 is classified as [`ApiError::Auth`] so callers can refresh the
    /// token; any other non-success status becomes [`ApiError::Http`] with
    /// the body (or status reason) as detail.
    async fn get(
        &self,
        path: &str,
        token: &str,
        params: &[(String, String)],
        log: LogRequests,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await?;
        let status = response.status();

        if log == LogRequests::Record {
            self.log
                .append(RequestLogEntry {
                    url: url.clone(),
                    params: params.to_vec(),
                    status: status.as_u16(),
                })
                .await;
        }

        if !status.is_success() {
            let detail = match response.text().await {
                Ok(body) if !body.is_empty() => body,
                _ => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            tracing::warn!("GET {} failed ({}): {}", path, status, detail);
            return Err(ApiError::from_status(status, detail));
        }

        let payload = response.json::<Value>().await?;
        tracing::debug!("GET {} ok ({} params)", path, params.len());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_log_append_snapshot_clear() {
        let log = RequestLog::new();
        assert_eq!(log.len().await, 0);

        log.append(RequestLogEntry {
            url: "https://example.org/api/sensor/list".to_string(),
            params: vec![],
            status: 200,
        })
        .await;
        log.append(RequestLogEntry {
            url: "https://example.org/api/stats/msg-rates".to_string(),
            params: vec![("serials".to_string(), "1,2".to_string())],
            status: 400,
        })
        .await;

        let entries = log.snapshot().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].status, 400);
        assert_eq!(entries[1].params[0].1, "1,2");

        log.clear().await;
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_log_is_shared_between_clones() {
        let log = RequestLog::new();
        let other = log.clone();
        other
            .append(RequestLogEntry {
                url: "u".to_string(),
                params: vec![],
                status: 200,
            })
            .await;
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_unauthenticated_get_is_classified() {
        let client = TelemetryClient::new(BASE_API_URL, RequestLog::new()).unwrap();
        let result = client
            .get("/sensor/list", "not-a-token", &[], LogRequests::Record)
            .await;
        assert!(matches!(result, Err(ApiError::Auth { .. })));
    }
}
