//! Host channel handler
//!
//! Two halves:
//! - the outbound half turns a [`HostSession`] into a Server-Sent Events
//!   stream that pushes `request_file` events to the browser in FIFO order;
//! - the reply half resolves pending requests when the host posts back file
//!   content or an error.
//!
//! The outbound stream owns the session, so the host is unregistered when
//! hyper drops the response body (the browser went away) or when the
//! channel closes.

use bytes::Bytes;
use futures::Stream;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::hosts::{HostEvent, HostSession};
use crate::pending::{FileContent, PendingTable};
use crate::types::{BrowserverError, HostId, RequestId, Result};

/// SSE comment written as soon as a receive stream opens
pub const OPEN_FRAME: &[u8] = b": connected\n\n";

/// SSE comment sent when no event went out for a keep-alive interval
pub const KEEPALIVE_FRAME: &[u8] = b": ping\n\n";

/// Encode one event as an SSE frame
pub fn encode_event(event: &HostEvent) -> Result<Bytes> {
    let data = event.data()?;
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), data)))
}

struct OutboundState {
    session: HostSession,
    keepalive: Interval,
    /// Set once the outbound channel closes; only keep-alives follow
    orphaned: bool,
}

/// Stream of SSE frames for one host
///
/// Runs until the response body is dropped. When the outbound channel
/// closes (another stream took over the id) the stream is orphaned: it
/// keeps emitting keep-alive comments and never sees another event, so the
/// browser is not prompted to reconnect. Keep-alive comments let a dead
/// connection surface as a write error within one interval.
pub fn event_stream(session: HostSession, keepalive: Duration) -> impl Stream<Item = Bytes> + Send {
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(host_id = %session.host_id(), "Host receive stream opened");

    let state = OutboundState {
        session,
        keepalive: ticker,
        orphaned: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            tokio::select! {
                event = state.session.recv(), if !state.orphaned => {
                    let Some(event) = event else {
                        info!(host_id = %state.session.host_id(), "Host outbound channel closed, stream orphaned");
                        state.orphaned = true;
                        continue;
                    };
                    match encode_event(&event) {
                        Ok(frame) => {
                            state.keepalive.reset();
                            return Some((frame, state));
                        }
                        Err(e) => {
                            warn!(host_id = %state.session.host_id(), "Dropping unencodable event: {}", e);
                        }
                    }
                }
                _ = state.keepalive.tick() => {
                    return Some((Bytes::from_static(KEEPALIVE_FRAME), state));
                }
            }
        }
    })
}

/// Resolve `request_id` with file content from `host_id`
///
/// Fails with `UnknownRequest` when the broker no longer tracks the id
/// (timed out, already cleaned up, or never issued) or when it was
/// dispatched to a different host. A second reply for a tracked id is
/// accepted and ignored.
pub fn deliver_content(
    pending: &PendingTable,
    host_id: &HostId,
    request_id: &RequestId,
    body: Bytes,
    declared_type: Option<String>,
) -> Result<()> {
    let size = body.len();
    pending
        .fulfill_success_from(
            host_id,
            request_id,
            FileContent {
                body,
                content_type: declared_type,
            },
        )
        .inspect(|_| debug!(host_id = %host_id, request_id = %request_id, bytes = size, "Host delivered content"))
        .inspect_err(|_| warn!(host_id = %host_id, request_id = %request_id, "Content for untracked request"))
}

/// Resolve `request_id` as not found on `host_id`; unknown ids are ignored
pub fn deliver_error(pending: &PendingTable, host_id: &HostId, request_id: &RequestId) {
    match pending.fulfill_failure_from(host_id, request_id) {
        Ok(()) => debug!(request_id = %request_id, "Host reported file error"),
        Err(BrowserverError::UnknownRequest(_)) => {
            debug!(request_id = %request_id, "Error report for untracked request ignored")
        }
        Err(e) => warn!(request_id = %request_id, "Error report failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::{FileRequest, HostRegistry};
    use crate::pending::Outcome;
    use futures::StreamExt;
    use std::sync::Arc;

    fn request(path: &str) -> HostEvent {
        HostEvent::RequestFile(FileRequest {
            id: RequestId::new(),
            path: path.to_string(),
            method: "GET".to_string(),
        })
    }

    #[test]
    fn test_encode_event_frame() {
        let event = request("logo.png");
        let frame = encode_event(&event).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: request_file\ndata: {"));
        assert!(text.ends_with("}\n\n"));
        assert_eq!(text.matches('\n').count(), 3);
    }

    #[tokio::test]
    async fn test_stream_yields_events_in_order() {
        let registry = Arc::new(HostRegistry::new());
        let host = HostId::from("brave-otter");
        let session = registry.register(host.clone());
        let sender = registry.lookup(&host).unwrap();

        sender.send(request("one.txt")).unwrap();
        sender.send(request("two.txt")).unwrap();

        let mut stream = Box::pin(event_stream(session, Duration::from_secs(60)));
        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert!(std::str::from_utf8(&first).unwrap().contains("one.txt"));
        assert!(std::str::from_utf8(&second).unwrap().contains("two.txt"));
    }

    #[tokio::test]
    async fn test_stream_sends_keepalive() {
        let registry = Arc::new(HostRegistry::new());
        let session = registry.register(HostId::from("brave-otter"));

        let mut stream = Box::pin(event_stream(session, Duration::from_millis(10)));
        let frame = stream.next().await.unwrap();
        assert_eq!(&frame[..], KEEPALIVE_FRAME);
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters_host() {
        let registry = Arc::new(HostRegistry::new());
        let host = HostId::from("brave-otter");
        let stream = event_stream(registry.register(host.clone()), Duration::from_secs(60));
        assert!(registry.is_online(&host));

        drop(stream);
        assert!(!registry.is_online(&host));
    }

    #[tokio::test]
    async fn test_replaced_stream_is_orphaned() {
        let registry = Arc::new(HostRegistry::new());
        let host = HostId::from("brave-otter");
        let mut old = Box::pin(event_stream(registry.register(host.clone()), Duration::from_millis(20)));
        let _new = registry.register(host.clone());

        // Events for the id now reach only the new session
        registry.lookup(&host).unwrap().send(request("a.txt")).unwrap();

        for _ in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(1), old.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&frame[..], KEEPALIVE_FRAME);
        }
        assert!(registry.is_online(&host));

        // Ending the orphan leaves the replacement registered
        drop(old);
        assert!(registry.is_online(&host));
    }

    #[tokio::test]
    async fn test_deliver_content_and_error() {
        let pending = Arc::new(PendingTable::new());
        let host = HostId::from("brave-otter");

        let req = pending.create(host.clone(), "a.txt", "GET", Duration::from_secs(5));
        deliver_content(&pending, &host, &req.id(), Bytes::from_static(b"hello"), Some("text/plain".into())).unwrap();
        // Late error after content is ignored
        deliver_error(&pending, &host, &req.id());
        assert_eq!(
            req.wait().await,
            Outcome::Delivered(FileContent {
                body: Bytes::from_static(b"hello"),
                content_type: Some("text/plain".to_string()),
            })
        );

        let unknown = RequestId::new();
        assert!(matches!(
            deliver_content(&pending, &host, &unknown, Bytes::new(), None),
            Err(BrowserverError::UnknownRequest(_))
        ));
        // Unknown ids are silently accepted on the error path
        deliver_error(&pending, &host, &unknown);
    }
}
