//! Host-facing routes under /admin
//!
//! - `GET /admin/admin` (and `GET /`) - redirect to a fresh host id
//! - `GET /admin/{id}` - the admin page a browser opens to become a host
//! - `GET /admin/{id}/events` - the host's receive stream (SSE)
//! - `POST /admin/{id}/upload/{request_id}` - file bytes for a request
//! - `POST /admin/{id}/error/{request_id}` - the host cannot serve a request

use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channel::{deliver_content, deliver_error, event_stream, OPEN_FRAME};
use crate::hosts::{generate_host_id, parse_host_id};
use crate::server::response::{
    bytes_response, error_response, json_response, redirect_response, text_response, to_boxed,
    BoxBody,
};
use crate::server::AppState;
use crate::types::{BrowserverError, RequestId, Result};

/// Header carrying the content type the host declares for an upload
pub const DECLARED_TYPE_HEADER: &str = "x-content-type";

#[derive(Serialize)]
struct Ack {
    status: &'static str,
}

/// Redirect to the admin page of a freshly generated, unused host id
pub fn redirect_to_new_host(state: &AppState) -> Response<Full<Bytes>> {
    let host_id = generate_host_id(&state.hosts);
    debug!(host_id = %host_id, "Assigned new host id");
    redirect_response(&format!("/admin/{}", host_id))
}

/// Dispatch a request whose path starts with `/admin/`; `rest` is the remainder
pub async fn handle_admin_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
    rest: &str,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let segments: Vec<&str> = rest.split('/').collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, ["admin"]) => to_boxed(redirect_to_new_host(&state)),

        (&Method::GET, [id]) => to_boxed(admin_page(&state, id).await),

        (&Method::GET, [id, "events"]) => host_events(&state, id),

        (&Method::POST, [id, "upload", request_id]) => {
            to_boxed(upload_file(&state, id, request_id, req).await)
        }

        (&Method::POST, [id, "error", request_id]) => to_boxed(report_error(&state, id, request_id)),

        (_, [_]) | (_, [_, "events"]) => to_boxed(method_not_allowed("GET")),

        (_, [_, "upload", _]) | (_, [_, "error", _]) => to_boxed(method_not_allowed("POST")),

        _ => to_boxed(error_response(BrowserverError::NotFound(format!(
            "/admin/{}",
            rest
        )))),
    }
}

/// Serve the admin client page; the id only matters to the page's script
async fn admin_page(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    if let Err(e) = parse_host_id(id) {
        return error_response(e);
    }

    let page = state.args.admin_page();
    match tokio::fs::read(&page).await {
        Ok(contents) => {
            let mut response = bytes_response(
                StatusCode::OK,
                HeaderValue::from_static("text/html; charset=utf-8"),
                Bytes::from(contents),
            );
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Admin page missing at {}", page.display());
            error_response(BrowserverError::NotFound("admin page".to_string()))
        }
        Err(e) => error_response(e.into()),
    }
}

/// Open the host's receive stream
///
/// Registers the host for as long as the response body lives. A second
/// stream for the same id takes over; the first stays open on keep-alives
/// only until its browser goes away.
fn host_events(state: &AppState, id: &str) -> Response<BoxBody> {
    let host_id = match parse_host_id(id) {
        Ok(host_id) => host_id,
        Err(e) => return to_boxed(error_response(e)),
    };

    info!(host_id = %host_id, "Host connected");
    let session = state.hosts.register(host_id);

    let frames = stream::once(future::ready(Bytes::from_static(OPEN_FRAME)))
        .chain(event_stream(session, state.args.keepalive_interval()))
        .map(|frame| Ok::<_, hyper::Error>(Frame::data(frame)));

    let mut response = Response::new(StreamBody::new(frames).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

async fn upload_file(
    state: &AppState,
    id: &str,
    request_id: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    match try_upload_file(state, id, request_id, req).await {
        Ok(()) => json_response(StatusCode::OK, &Ack { status: "received" }),
        Err(e) => error_response(e),
    }
}

async fn try_upload_file(
    state: &AppState,
    id: &str,
    request_id: &str,
    req: Request<Incoming>,
) -> Result<()> {
    let host_id = parse_host_id(id)?;
    // An id that does not parse was never issued
    let request_id: RequestId = request_id
        .parse()
        .map_err(|_| BrowserverError::NotFound("Request ID not found".to_string()))?;

    // Refuse stale uploads before buffering their bodies
    if !state.pending.is_pending_for(&host_id, &request_id) {
        debug!(host_id = %host_id, request_id = %request_id, "Upload for untracked request");
        return Err(BrowserverError::UnknownRequest(request_id));
    }

    let declared_type = req
        .headers()
        .get(DECLARED_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
    deliver_content(&state.pending, &host_id, &request_id, body, declared_type)
}

/// Host reports it cannot serve a request; always acknowledged
fn report_error(state: &AppState, id: &str, request_id: &str) -> Response<Full<Bytes>> {
    match (parse_host_id(id), request_id.parse::<RequestId>()) {
        (Ok(host_id), Ok(request_id)) => deliver_error(&state.pending, &host_id, &request_id),
        _ => debug!(host = id, request_id, "Ignoring error report with malformed ids"),
    }
    json_response(StatusCode::OK, &Ack { status: "error_logged" })
}

/// Collect an upload body, refusing anything over `limit` bytes
async fn read_body(body: Incoming, limit: usize) -> Result<Bytes> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(BrowserverError::PayloadTooLarge(limit))
        }
        Err(e) => Err(BrowserverError::BadRequest(format!(
            "Failed to read request body: {}",
            e
        ))),
    }
}

fn method_not_allowed(allow: &'static str) -> Response<Full<Bytes>> {
    let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}
