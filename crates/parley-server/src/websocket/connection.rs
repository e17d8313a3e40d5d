//! The hub-side handle of one connected client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parley_core::{ClientId, Envelope, PlayerSnapshot, Role};
use tokio::sync::mpsc;
use tracing::warn;

use crate::metrics::ROOM_BROADCAST_DROPS_TOTAL;

/// A client as seen by its room hub.
///
/// The hub owns this value, and with it the only sender of the client's
/// outbound queue: dropping the handle closes the queue, which ends the
/// client's outbound pump.
pub struct ClientHandle {
    id: ClientId,
    name: String,
    role: Role,
    alive: bool,
    tx: mpsc::Sender<Arc<str>>,
    dropped: AtomicU64,
}

impl ClientHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        id: ClientId,
        name: String,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id,
            name,
            role: Role::default(),
            alive: true,
            tx,
            dropped: AtomicU64::new(0),
        };
        (handle, rx)
    }

    /// Client ID.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cosmetic role, announced in the `hello` envelope.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Liveness flag reported in snapshots.
    ///
    /// Set on admission; no relay operation clears it.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Enqueue a payload without waiting.
    ///
    /// Returns `false` when the queue is full or closed; the payload is
    /// dropped and counted.
    pub fn send(&self, payload: Arc<str>) -> bool {
        if self.tx.try_send(payload).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!(ROOM_BROADCAST_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Encode and enqueue an envelope.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(json) => self.send(Arc::from(json)),
            Err(e) => {
                warn!(client_id = %self.id, error = %e, "failed to encode envelope");
                false
            }
        }
    }

    /// Payloads dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Display projection with the given readiness.
    pub fn snapshot(&self, ready: bool) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            alive: self.alive,
            ready,
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}
