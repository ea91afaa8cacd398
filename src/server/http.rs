//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. One task per
//! connection; host receive streams hold their connection open for as
//! long as the browser tab stays connected.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::gateway::Gateway;
use crate::hosts::{parse_host_id, HostRegistry};
use crate::pending::PendingTable;
use crate::routes;
use crate::server::response::{error_response, text_response, to_boxed, with_server_header, BoxBody};
use crate::types::{BrowserverError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub hosts: Arc<HostRegistry>,
    pub pending: Arc<PendingTable>,
    pub gateway: Gateway,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args) -> Self {
        let hosts = Arc::new(HostRegistry::new());
        let pending = Arc::new(PendingTable::new());
        let gateway = Gateway::new(
            Arc::clone(&hosts),
            Arc::clone(&pending),
            args.request_timeout(),
            args.index_document.clone(),
        );

        Self {
            args,
            hosts,
            pending,
            gateway,
            started_at: Instant::now(),
        }
    }
}

/// Bind the configured address and serve forever
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Browserver listening on {}", state.args.listen);
    info!(
        "Request timeout {}ms, keep-alive every {}s",
        state.args.request_timeout_ms, state.args.keepalive_secs
    );

    serve(listener, state).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        // Closing a tab mid-stream lands here
                        debug!("Connection from {} ended: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => to_boxed(routes::redirect_to_new_host(&state)),

        // Liveness probe
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => to_boxed(routes::health_check()),

        (&Method::GET, "/version") => to_boxed(routes::version_info()),

        (&Method::GET, "/status") => to_boxed(routes::status_check(&state)),

        (_, p) if p.starts_with("/admin/") => {
            let rest = p["/admin/".len()..].to_string();
            routes::handle_admin_request(Arc::clone(&state), req, &rest).await
        }

        _ => to_boxed(handle_public_request(&state, &method, &path).await),
    };

    Ok(with_server_header(response))
}

/// Public access: `/{host_id}/{path...}`
async fn handle_public_request(
    state: &AppState,
    method: &Method,
    path: &str,
) -> Response<Full<Bytes>> {
    let Some((raw_host, raw_path)) = path.trim_start_matches('/').split_once('/') else {
        return error_response(BrowserverError::NotFound(path.to_string()));
    };

    if !matches!(*method, Method::GET | Method::POST | Method::PUT | Method::DELETE) {
        let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, POST, PUT, DELETE"));
        return response;
    }

    let decoded = urlencoding::decode(raw_host)
        .and_then(|host| urlencoding::decode(raw_path).map(|file| (host, file)));
    let (host, file) = match decoded {
        Ok(parts) => parts,
        Err(_) => {
            return error_response(BrowserverError::BadRequest(
                "Path is not valid UTF-8".to_string(),
            ))
        }
    };

    let host_id = match parse_host_id(&host) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    state.gateway.handle(&host_id, &file, method).await
}
