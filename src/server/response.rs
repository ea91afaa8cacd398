//! Response builders shared by the route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, LOCATION, SERVER};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::BrowserverError;

/// Boxed response body; not `Sync` so streaming bodies fit
pub type BoxBody = http_body_util::combinators::UnsyncBoxBody<Bytes, hyper::Error>;

/// Value of the `Server` header on every response
pub const SERVER_NAME: &str = "Browserver/1.1";

/// Plain text response
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    bytes_response(
        status,
        HeaderValue::from_static("text/plain; charset=utf-8"),
        body.into(),
    )
}

/// Response with an arbitrary content type
pub fn bytes_response(
    status: StatusCode,
    content_type: HeaderValue,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}

/// JSON response; falls back to a 500 if serialization fails
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = bytes_response(
                status,
                HeaderValue::from_static("application/json"),
                Bytes::from(body),
            );
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal serialization error")
        }
    }
}

/// Temporary redirect to `location`
pub fn redirect_response(location: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => text_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target"),
    }
}

/// Map an error onto its status code with the message as body
pub fn error_response(err: BrowserverError) -> Response<Full<Bytes>> {
    let (status, body) = err.into_status_code_and_body();
    text_response(status, body)
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed_unsync())
}

/// Stamp the branding header
pub fn with_server_header<B>(mut response: Response<B>) -> Response<B> {
    response
        .headers_mut()
        .insert(SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}
