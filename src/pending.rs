//! Pending request table
//!
//! Correlates each public request with the single host reply that may
//! resolve it. Every entry holds a one-shot result slot: the first
//! fulfillment takes the sender, so later ones (duplicates, replies after
//! the waiter gave up) find the slot empty and are dropped silently.
//!
//! The waiter owns a [`PendingRequest`] handle. Dropping it removes the
//! entry, which covers every exit path: resolution, timeout, and the
//! request future being cancelled when the public caller disconnects.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{BrowserverError, HostId, RequestId, Result};

/// File bytes delivered by a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub body: Bytes,
    /// Content type declared by the host, if any
    pub content_type: Option<String>,
}

/// Value written into a result slot
#[derive(Debug)]
enum Delivery {
    Content(FileContent),
    NotFound,
}

/// How waiting on a pending request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered(FileContent),
    NotFound,
    TimedOut,
}

struct PendingEntry {
    host_id: HostId,
    path: String,
    method: String,
    slot: Option<oneshot::Sender<Delivery>>,
    deadline: Instant,
}

/// Concurrent map of outstanding requests
pub struct PendingTable {
    entries: DashMap<RequestId, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Install a new entry and return the waiter's handle
    pub fn create(
        self: &Arc<Self>,
        host_id: HostId,
        path: impl Into<String>,
        method: impl Into<String>,
        timeout: Duration,
    ) -> PendingRequest {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        // A v4 collision with a live entry is practically impossible, but
        // never hand out an id that is already owned.
        let id = loop {
            let id = RequestId::new();
            if !self.entries.contains_key(&id) {
                break id;
            }
        };

        let entry = PendingEntry {
            host_id,
            path: path.into(),
            method: method.into(),
            slot: Some(tx),
            deadline,
        };
        debug!(
            request_id = %id,
            host_id = %entry.host_id,
            method = %entry.method,
            path = %entry.path,
            "Pending request created"
        );
        self.entries.insert(id, entry);

        PendingRequest {
            table: Arc::clone(self),
            id,
            receiver: Some(rx),
            deadline,
        }
    }

    /// Resolve `id` with content delivered by the host
    ///
    /// Errors only if the id is unknown; an entry that is already resolved
    /// accepts and ignores the call.
    pub fn fulfill_success(&self, id: &RequestId, content: FileContent) -> Result<()> {
        self.fulfill(id, None, Delivery::Content(content))
    }

    /// Resolve `id` as not found on the host, with the same rules as
    /// [`fulfill_success`](Self::fulfill_success)
    pub fn fulfill_failure(&self, id: &RequestId) -> Result<()> {
        self.fulfill(id, None, Delivery::NotFound)
    }

    /// Like [`fulfill_success`](Self::fulfill_success), but only the host the
    /// request was dispatched to may resolve it
    pub fn fulfill_success_from(
        &self,
        host_id: &HostId,
        id: &RequestId,
        content: FileContent,
    ) -> Result<()> {
        self.fulfill(id, Some(host_id), Delivery::Content(content))
    }

    /// Like [`fulfill_failure`](Self::fulfill_failure), restricted to the
    /// dispatching host
    pub fn fulfill_failure_from(&self, host_id: &HostId, id: &RequestId) -> Result<()> {
        self.fulfill(id, Some(host_id), Delivery::NotFound)
    }

    fn fulfill(&self, id: &RequestId, from: Option<&HostId>, delivery: Delivery) -> Result<()> {
        // Take the sender while holding the shard lock, send after releasing it
        let sender = match self.entries.get_mut(id) {
            Some(entry) if from.is_some_and(|host| host != &entry.host_id) => {
                warn!(
                    request_id = %id,
                    expected = %entry.host_id,
                    "Reply from a host the request was not dispatched to"
                );
                return Err(BrowserverError::UnknownRequest(*id));
            }
            Some(mut entry) => entry.slot.take(),
            None => return Err(BrowserverError::UnknownRequest(*id)),
        };

        match sender {
            Some(tx) => {
                if tx.send(delivery).is_err() {
                    debug!(request_id = %id, "Waiter already gone, reply dropped");
                }
            }
            None => debug!(request_id = %id, "Duplicate reply ignored"),
        }
        Ok(())
    }

    /// Drop the entry for `id`; no-op if absent
    pub fn remove(&self, id: &RequestId) -> bool {
        let removed = self.entries.remove(id);
        if let Some((_, entry)) = &removed {
            debug!(
                request_id = %id,
                host_id = %entry.host_id,
                overdue = Instant::now() > entry.deadline,
                "Pending request removed"
            );
        }
        removed.is_some()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is outstanding and was dispatched to `host_id`
    ///
    /// Lets a reply endpoint reject a stale upload before reading its body;
    /// the entry can still expire afterwards, so fulfillment checks again.
    pub fn is_pending_for(&self, host_id: &HostId, id: &RequestId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| &entry.host_id == host_id && entry.slot.is_some())
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiter's handle on one pending request
///
/// Removes its table entry when dropped.
pub struct PendingRequest {
    table: Arc<PendingTable>,
    id: RequestId,
    receiver: Option<oneshot::Receiver<Delivery>>,
    deadline: Instant,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the first resolution or the deadline, whichever comes first
    ///
    /// The entry is removed before this returns.
    pub async fn wait(mut self) -> Outcome {
        let Some(receiver) = self.receiver.take() else {
            return Outcome::TimedOut;
        };

        match tokio::time::timeout_at(self.deadline, receiver).await {
            Ok(Ok(Delivery::Content(content))) => Outcome::Delivered(content),
            Ok(Ok(Delivery::NotFound)) => Outcome::NotFound,
            Ok(Err(_)) => {
                // Entry was removed out from under the waiter
                warn!(request_id = %self.id, "Result slot dropped before resolution");
                Outcome::TimedOut
            }
            Err(_) => Outcome::TimedOut,
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn content(body: &'static [u8], content_type: Option<&str>) -> FileContent {
        FileContent {
            body: Bytes::from_static(body),
            content_type: content_type.map(str::to_string),
        }
    }

    fn table() -> Arc<PendingTable> {
        Arc::new(PendingTable::new())
    }

    #[tokio::test]
    async fn test_success_resolves_waiter() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "logo.png", "GET", Duration::from_secs(5));
        let id = pending.id();
        assert!(table.contains(&id));

        table
            .fulfill_success(&id, content(b"\x89PNG", Some("image/png")))
            .unwrap();

        assert_eq!(
            pending.wait().await,
            Outcome::Delivered(content(b"\x89PNG", Some("image/png")))
        );
        assert!(!table.contains(&id));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_failure_resolves_not_found() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "missing.txt", "GET", Duration::from_secs(5));
        table.fulfill_failure(&pending.id()).unwrap();
        assert_eq!(pending.wait().await, Outcome::NotFound);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "slow.bin", "GET", Duration::from_millis(20));
        let id = pending.id();

        assert_eq!(pending.wait().await, Outcome::TimedOut);
        assert!(!table.contains(&id));

        // A late reply finds nothing to resolve
        let err = table.fulfill_success(&id, content(b"late", None)).unwrap_err();
        assert!(matches!(err, BrowserverError::UnknownRequest(_)));
        assert!(table.fulfill_failure(&id).is_err());
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let table = table();

        // content then content
        let pending = table.create(HostId::from("brave-otter"), "a", "GET", Duration::from_secs(5));
        assert_ok!(table.fulfill_success(&pending.id(), content(b"first", None)));
        assert_ok!(table.fulfill_success(&pending.id(), content(b"second", None)));
        assert_eq!(pending.wait().await, Outcome::Delivered(content(b"first", None)));

        // content then error
        let pending = table.create(HostId::from("brave-otter"), "b", "GET", Duration::from_secs(5));
        table.fulfill_success(&pending.id(), content(b"body", None)).unwrap();
        table.fulfill_failure(&pending.id()).unwrap();
        assert_eq!(pending.wait().await, Outcome::Delivered(content(b"body", None)));

        // error then content
        let pending = table.create(HostId::from("brave-otter"), "c", "GET", Duration::from_secs(5));
        table.fulfill_failure(&pending.id()).unwrap();
        table.fulfill_success(&pending.id(), content(b"body", None)).unwrap();
        assert_eq!(pending.wait().await, Outcome::NotFound);

        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_id() {
        let table = table();
        let id = RequestId::new();
        assert!(matches!(
            table.fulfill_success(&id, content(b"x", None)),
            Err(BrowserverError::UnknownRequest(_))
        ));
        assert!(!table.remove(&id));
    }

    #[test]
    fn test_drop_without_waiting_removes_entry() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "x", "GET", Duration::from_secs(5));
        let id = pending.id();
        drop(pending);
        assert!(!table.contains(&id));
    }

    #[tokio::test]
    async fn test_removed_entry_wakes_waiter() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "x", "GET", Duration::from_secs(30));
        table.remove(&pending.id());
        assert_eq!(pending.wait().await, Outcome::TimedOut);
    }

    #[tokio::test]
    async fn test_reply_from_other_host_is_rejected() {
        let table = table();
        let pending = table.create(HostId::from("brave-otter"), "a", "GET", Duration::from_secs(5));
        let id = pending.id();

        let intruder = HostId::from("quiet-heron");
        assert_err!(table.fulfill_success_from(&intruder, &id, content(b"evil", None)));
        assert_err!(table.fulfill_failure_from(&intruder, &id));

        assert_ok!(table.fulfill_success_from(&HostId::from("brave-otter"), &id, content(b"good", None)));
        assert_eq!(pending.wait().await, Outcome::Delivered(content(b"good", None)));
    }

    #[tokio::test]
    async fn test_is_pending_for() {
        let table = table();
        let host = HostId::from("brave-otter");
        let pending = table.create(host.clone(), "a", "GET", Duration::from_secs(5));
        let id = pending.id();

        assert!(table.is_pending_for(&host, &id));
        assert!(!table.is_pending_for(&HostId::from("quiet-heron"), &id));
        assert!(!table.is_pending_for(&host, &RequestId::new()));

        // Resolved but not yet collected by the waiter
        assert_ok!(table.fulfill_failure(&id));
        assert!(!table.is_pending_for(&host, &id));

        assert_eq!(pending.wait().await, Outcome::NotFound);
        assert!(!table.is_pending_for(&host, &id));
    }

    #[tokio::test]
    async fn test_ids_are_distinct_across_concurrent_creates() {
        let table = table();
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let table = Arc::clone(&table);
                tokio::spawn(async move {
                    table.create(HostId::from("brave-otter"), format!("f{}", i), "GET", Duration::from_secs(5))
                })
            })
            .collect();

        let mut live = Vec::new();
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let pending = handle.await.unwrap();
            assert!(ids.insert(pending.id()));
            live.push(pending);
        }
        assert_eq!(table.len(), 64);

        drop(live);
        assert!(table.is_empty());
    }
}
