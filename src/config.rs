//! Configuration for Browserver
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{BrowserverError, Result};

/// Browserver - serve files from a browser tab through a public broker
#[derive(Parser, Debug, Clone)]
#[command(name = "browserver")]
#[command(about = "Correlation broker between public HTTP callers and browser-hosted files")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// How long a public request waits for the host to reply, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "15000")]
    pub request_timeout_ms: u64,

    /// Interval between keep-alive comments on host receive streams, in seconds
    #[arg(long, env = "KEEPALIVE_SECS", default_value = "15")]
    pub keepalive_secs: u64,

    /// Directory holding the admin client (index.html is served at /admin/{id})
    #[arg(long, env = "CLIENT_DIR", default_value = "client")]
    pub client_dir: PathBuf,

    /// Document requested from the host when the public path is empty
    #[arg(long, env = "INDEX_DOCUMENT", default_value = "index.html")]
    pub index_document: String,

    /// Largest file body a host may upload, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "67108864")]
    pub max_upload_bytes: usize,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// Path of the admin page on disk
    pub fn admin_page(&self) -> PathBuf {
        self.client_dir.join("index.html")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(BrowserverError::Config(
                "REQUEST_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        if self.keepalive_secs == 0 {
            return Err(BrowserverError::Config(
                "KEEPALIVE_SECS must be greater than zero".to_string(),
            ));
        }

        if self.index_document.trim().is_empty() {
            return Err(BrowserverError::Config(
                "INDEX_DOCUMENT must not be empty".to_string(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(BrowserverError::Config(
                "MAX_UPLOAD_BYTES must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: "info".to_string(),
            log_json: false,
            request_timeout_ms: 15_000,
            keepalive_secs: 15,
            client_dir: PathBuf::from("client"),
            index_document: "index.html".to_string(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let parsed = Args::parse_from(["browserver"]);
        let default = Args::default();
        assert_eq!(parsed.listen, default.listen);
        assert_eq!(parsed.request_timeout_ms, default.request_timeout_ms);
        assert_eq!(parsed.keepalive_secs, default.keepalive_secs);
        assert_eq!(parsed.index_document, default.index_document);
        assert_eq!(parsed.max_upload_bytes, default.max_upload_bytes);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "browserver",
            "--listen",
            "127.0.0.1:9000",
            "--request-timeout-ms",
            "250",
            "--client-dir",
            "/srv/client",
        ]);
        assert_eq!(args.listen, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(args.request_timeout(), Duration::from_millis(250));
        assert_eq!(args.admin_page(), PathBuf::from("/srv/client/index.html"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let args = Args {
            request_timeout_ms: 0,
            ..Args::default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_index() {
        let args = Args {
            index_document: "  ".to_string(),
            ..Args::default()
        };
        let err = args.validate().unwrap_err();
        assert!(matches!(err, BrowserverError::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: INDEX_DOCUMENT must not be empty");
    }
}
