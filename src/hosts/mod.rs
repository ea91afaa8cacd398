//! Online hosts: registry, outbound events and session id generation

pub mod registry;
pub mod slug;

pub use registry::{HostRegistry, HostSender, HostSession};
pub use slug::{generate_host_id, RESERVED_HOST_ID};

use serde::Serialize;

use crate::types::{BrowserverError, HostId, RequestId, Result};

/// Longest host id accepted from a request path
pub const MAX_HOST_ID_LEN: usize = 64;

/// Validate a host id taken from a request path
///
/// Rejects empty ids, the reserved `admin` segment and anything that could
/// not round-trip through a single path segment.
pub fn parse_host_id(raw: &str) -> Result<HostId> {
    if raw.is_empty() {
        return Err(BrowserverError::BadRequest("Host id is empty".to_string()));
    }
    if raw == RESERVED_HOST_ID {
        return Err(BrowserverError::BadRequest(format!("'{}' is reserved", raw)));
    }
    if raw.len() > MAX_HOST_ID_LEN {
        return Err(BrowserverError::BadRequest("Host id is too long".to_string()));
    }
    if raw.chars().any(|c| c == '/' || c.is_control() || c.is_whitespace()) {
        return Err(BrowserverError::BadRequest("Host id contains invalid characters".to_string()));
    }
    Ok(HostId::from(raw))
}

/// Message pushed down a host's receive stream
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Ask the host to serve `path`
    RequestFile(FileRequest),
}

/// Payload of a `request_file` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRequest {
    pub id: RequestId,
    pub path: String,
    pub method: String,
}

impl HostEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestFile(_) => "request_file",
        }
    }

    /// JSON-encoded event data
    pub fn data(&self) -> Result<String> {
        match self {
            Self::RequestFile(req) => Ok(serde_json::to_string(req)?),
        }
    }
}
