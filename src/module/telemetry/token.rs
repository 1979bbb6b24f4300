///! Bearer-token management
///!
///! Exchanges client credentials for a short-lived bearer token and caches
///! it for a window deliberately shorter than the upstream 30-minute expiry,
///! so a fresh exchange happens proactively instead of serving an
///! about-to-expire token. No automatic retry: a failed exchange surfaces to
///! the caller as a descriptive error.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::module::cache::{Clock, SystemClock, TtlCache};

pub const AUTH_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

/// Upstream tokens live ~30 minutes; refresh after 25.
const TOKEN_TTL: Duration = Duration::from_secs(1500);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

pub struct TokenManager {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    cache: TtlCache<(String, String), String>,
}

impl TokenManager {
    pub fn new(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::with_clock(auth_url, client_id, client_secret, Arc::new(SystemClock))
    }

    pub fn with_clock(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: TtlCache::new(TOKEN_TTL, clock),
        })
    }

    /// Return a bearer token, reusing the cached one while it is fresh.
    pub async fn get_token(&self) -> Result<String, ApiError> {
        let key = self.cache_key();
        if let Some(token) = self.cache.get(&key).await {
            return Ok(token);
        }
        let token = self.exchange().await?;
        self.cache.insert(key, token.clone()).await;
        Ok(token)
    }

    /// Force a fresh exchange, replacing the cached token. The recovery path
    /// after the telemetry API answers 401 mid-window.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let token = self.exchange().await?;
        self.cache.insert(self.cache_key(), token.clone()).await;
        Ok(token)
    }

    fn cache_key(&self) -> (String, String) {
        (self.client_id.clone(), self.client_secret.clone())
    }

    async fn exchange(&self) -> Result<String, ApiError> {
        tracing::debug!("Exchanging client credentials for a bearer token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self.client.post(&self.auth_url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth {
                detail: format!("token request failed ({}): {}", status.as_u16(), body),
            });
        }
        let payload = response.json::<Value>().await?;
        token_from_payload(payload)
    }
}

/// Extract `access_token` from the exchange response; a missing or empty
/// field is an auth failure, not a malformed-payload failure.
fn token_from_payload(payload: Value) -> Result<String, ApiError> {
    let parsed: TokenResponse = serde_json::from_value(payload).unwrap_or(TokenResponse {
        access_token: None,
    });
    parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Auth {
            detail: "token response did not include access_token".to_string(),
        })
}
