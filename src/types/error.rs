//! Error types for Browserver

use hyper::StatusCode;

use super::{HostId, RequestId};

/// Main error type for Browserver operations
#[derive(Debug, thiserror::Error)]
pub enum BrowserverError {
    /// No receive stream is open for the host, or it closed mid-dispatch
    #[error("Host '{0}' is not online.")]
    HostOffline(HostId),

    /// The host did not answer before the request deadline
    #[error("Host timed out.")]
    RequestTimeout,

    /// The host explicitly reported that it cannot serve the path
    #[error("File not found on host.")]
    HostReportedNotFound(String),

    /// A reply arrived for a request the broker is not tracking
    #[error("Request ID not found: {0}")]
    UnknownRequest(RequestId),

    /// Upload body exceeded the configured limit (bytes)
    #[error("Payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrowserverError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HostOffline(_) => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::HostReportedNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownRequest(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for BrowserverError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BrowserverError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

/// Result type alias for Browserver operations
pub type Result<T> = std::result::Result<T, BrowserverError>;
