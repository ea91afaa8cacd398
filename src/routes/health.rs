//! Health and status endpoints
//!
//! - /health, /healthz - liveness probe
//! - /version - build information
//! - /status - online hosts and outstanding requests

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::server::response::json_response;
use crate::server::AppState;
use crate::types::HostId;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
}

/// Liveness probe; 200 whenever the process is serving
pub fn health_check() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "browserver",
        },
    )
}

/// Broker snapshot served at /status
#[derive(Serialize)]
pub struct StatusResponse {
    /// Current timestamp
    pub timestamp: String,
    /// Uptime in seconds
    pub uptime: u64,
    /// Ids of hosts with an open receive stream
    pub hosts: Vec<HostId>,
    /// Public requests waiting on a host
    pub pending_requests: usize,
    pub request_timeout_ms: u64,
}

pub fn status_check(state: &AppState) -> Response<Full<Bytes>> {
    let response = StatusResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.started_at.elapsed().as_secs(),
        hosts: state.hosts.host_ids(),
        pending_requests: state.pending.len(),
        request_timeout_ms: state.args.request_timeout_ms,
    };
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_version_info_fields() {
        let response = version_info();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["service"], "browserver");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_lists_online_hosts() {
        let state = AppState::new(Args::default());
        let _session = state.hosts.register(HostId::from("brave-otter"));

        let json = body_json(status_check(&state)).await;
        assert_eq!(json["hosts"], serde_json::json!(["brave-otter"]));
        assert_eq!(json["pending_requests"], 0);
        assert_eq!(json["request_timeout_ms"], 15000);
    }
}
