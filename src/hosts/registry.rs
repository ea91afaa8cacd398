//! Registry of online hosts
//!
//! Maps a host id to the sending half of that host's outbound event channel.
//! Entries live exactly as long as the host's receive stream: the stream owns
//! a [`HostSession`] and dropping it releases the slot.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::HostEvent;
use crate::types::HostId;

/// Sending half of a host's outbound channel
pub type HostSender = mpsc::UnboundedSender<HostEvent>;

/// Registry slot for one online host
struct HostEntry {
    sender: HostSender,
    /// Distinguishes successive sessions registered under the same id
    session: u64,
    connected_at: Instant,
}

/// Concurrent map of online hosts
pub struct HostRegistry {
    hosts: DashMap<HostId, HostEntry>,
    next_session: AtomicU64,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// Bind a fresh outbound channel under `host_id`
    ///
    /// An existing binding for the same id is replaced (last writer wins).
    /// The replaced stream keeps running until every in-flight clone of its
    /// sender is gone, after which its receiver reports the channel closed.
    pub fn register(self: &Arc<Self>, host_id: HostId) -> HostSession {
        let (sender, receiver) = mpsc::unbounded_channel();
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);

        let entry = HostEntry {
            sender,
            session,
            connected_at: Instant::now(),
        };

        if let Some(previous) = self.hosts.insert(host_id.clone(), entry) {
            warn!(
                host_id = %host_id,
                replaced_session = previous.session,
                session,
                "Host re-registered, previous receive stream orphaned"
            );
        } else {
            info!(host_id = %host_id, session, "Host online ({} online)", self.hosts.len());
        }

        HostSession {
            registry: Arc::clone(self),
            host_id,
            session,
            receiver,
        }
    }

    /// Sender for `host_id`, if the host is online
    pub fn lookup(&self, host_id: &HostId) -> Option<HostSender> {
        self.hosts.get(host_id).map(|entry| entry.sender.clone())
    }

    /// Remove the binding for `host_id` regardless of which session owns it
    pub fn unregister(&self, host_id: &HostId) -> bool {
        let removed = self.hosts.remove(host_id).is_some();
        if removed {
            info!(host_id = %host_id, "Host offline ({} online)", self.hosts.len());
        }
        removed
    }

    /// Remove the binding only if it still belongs to `session`
    fn release(&self, host_id: &HostId, session: u64) {
        match self.hosts.remove_if(host_id, |_, entry| entry.session == session) {
            Some((_, entry)) => info!(
                host_id = %host_id,
                session,
                online_secs = entry.connected_at.elapsed().as_secs(),
                "Host offline ({} online)",
                self.hosts.len()
            ),
            None => debug!(
                host_id = %host_id,
                session,
                "Stale session ended, slot already taken over"
            ),
        }
    }

    pub fn is_online(&self, host_id: &HostId) -> bool {
        self.hosts.contains_key(host_id)
    }

    pub fn online_count(&self) -> usize {
        self.hosts.len()
    }

    /// Snapshot of online host ids, sorted
    pub fn host_ids(&self) -> Vec<HostId> {
        let mut ids: Vec<HostId> = self.hosts.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One live host receive stream
///
/// Owns the receiving half of the outbound channel. Dropping the session
/// unregisters the host, so every way the stream can end (clean close,
/// write error, task cancellation) releases the registry slot.
pub struct HostSession {
    registry: Arc<HostRegistry>,
    host_id: HostId,
    session: u64,
    receiver: mpsc::UnboundedReceiver<HostEvent>,
}

impl HostSession {
    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    /// Next queued event, or `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.receiver.recv().await
    }
}

impl std::fmt::Debug for HostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession")
            .field("host_id", &self.host_id)
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.registry.release(&self.host_id, self.session);
    }
}
