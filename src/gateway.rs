//! Public gateway
//!
//! Turns a public `METHOD /{host_id}/{path}` call into a `request_file`
//! event on the host's receive stream, then waits for the host's reply or
//! the request deadline.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderValue;
use hyper::{Method, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::hosts::{FileRequest, HostEvent, HostRegistry};
use crate::pending::{FileContent, Outcome, PendingTable};
use crate::server::response::{bytes_response, error_response};
use crate::types::{BrowserverError, HostId, Result};

/// Public request handler bound to a registry and a pending table
pub struct Gateway {
    hosts: Arc<HostRegistry>,
    pending: Arc<PendingTable>,
    request_timeout: Duration,
    index_document: String,
}

impl Gateway {
    pub fn new(
        hosts: Arc<HostRegistry>,
        pending: Arc<PendingTable>,
        request_timeout: Duration,
        index_document: impl Into<String>,
    ) -> Self {
        Self {
            hosts,
            pending,
            request_timeout,
            index_document: index_document.into(),
        }
    }

    /// Serve one public request as an HTTP response
    pub async fn handle(&self, host_id: &HostId, path: &str, method: &Method) -> Response<Full<Bytes>> {
        let path = self.resolve_path(path);
        let started = Instant::now();

        match self.dispatch(host_id, &path, method.as_str()).await {
            Ok(content) => {
                let content_type = resolve_content_type(content.content_type.as_deref(), &path);
                info!(
                    host_id = %host_id,
                    path = %path,
                    bytes = content.body.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Served file from host"
                );
                bytes_response(StatusCode::OK, content_type, content.body)
            }
            Err(err) => {
                match &err {
                    BrowserverError::HostOffline(_) => debug!(host_id = %host_id, path = %path, "Host offline"),
                    other => warn!(
                        host_id = %host_id,
                        path = %path,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Public request failed: {}",
                        other
                    ),
                }
                error_response(err)
            }
        }
    }

    /// Forward `path` to the host and wait for its reply
    ///
    /// Errors with `HostOffline` before creating any pending entry when the
    /// host has no receive stream.
    pub async fn dispatch(&self, host_id: &HostId, path: &str, method: &str) -> Result<FileContent> {
        let Some(sender) = self.hosts.lookup(host_id) else {
            return Err(BrowserverError::HostOffline(host_id.clone()));
        };

        let pending = self
            .pending
            .create(host_id.clone(), path, method, self.request_timeout);
        let request_id = pending.id();

        let event = HostEvent::RequestFile(FileRequest {
            id: request_id,
            path: path.to_string(),
            method: method.to_string(),
        });

        // Receiver dropped between lookup and push: the host just went away
        if sender.send(event).is_err() {
            return Err(BrowserverError::HostOffline(host_id.clone()));
        }
        debug!(request_id = %request_id, host_id = %host_id, path = %path, "Dispatched to host");

        match pending.wait().await {
            Outcome::Delivered(content) => Ok(content),
            Outcome::NotFound => Err(BrowserverError::HostReportedNotFound(path.to_string())),
            Outcome::TimedOut => Err(BrowserverError::RequestTimeout),
        }
    }

    /// Substitute the index document for directory-style paths
    pub fn resolve_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.index_document.clone()
        } else if path.ends_with('/') {
            format!("{}{}", path, self.index_document)
        } else {
            path.to_string()
        }
    }
}

/// Content type for a delivered file
///
/// Prefers the host's declared type, then the path extension, then
/// `application/octet-stream`.
pub fn resolve_content_type(declared: Option<&str>, path: &str) -> HeaderValue {
    declared
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| HeaderValue::from_str(t).ok())
        .unwrap_or_else(|| HeaderValue::from_static(guess_content_type(path)))
}

/// Guess MIME type from file extension
pub fn guess_content_type(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let extension = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "webp" => "image/webp",
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "wasm" => "application/wasm",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
