///! Error taxonomy for the aggregation layer
///!
///! Callers match on these to decide between re-authentication and a
///! degraded section of output. Normalization failures are never errors
///! (malformed rows are silently excluded at the parse boundary), and empty
///! upstream data is a valid empty result, not a failure.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 from the telemetry API, a rejected credential exchange, or a
    /// token response missing `access_token`. Signals the caller to refresh
    /// the bearer token rather than treat this as a generic failure.
    #[error("unauthorized: {detail}")]
    Auth { detail: String },

    /// Any other non-success HTTP status, carrying the body (or the status
    /// reason) for diagnostics.
    #[error("request failed ({status}): {detail}")]
    Http { status: u16, detail: String },

    /// Connect/timeout/body-decode failures. Handled by callers the same way
    /// as `Http`; timeouts are not a distinct retry category.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Classify a non-success response status. 401 is the auth signal;
    /// everything else keeps its status for diagnostics.
    pub fn from_status(status: StatusCode, detail: String) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            ApiError::Auth { detail }
        } else {
            ApiError::Http {
                status: status.as_u16(),
                detail,
            }
        }
    }

    /// True when the caller should re-authenticate before retrying.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}
