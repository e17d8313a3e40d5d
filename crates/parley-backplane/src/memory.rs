//! In-process backends.
//!
//! [`MemoryHistory`] keeps a capped deque per room. [`MemoryBus`] is a shared
//! broadcast bus standing in for a Redis server; each relay instance gets its
//! own [`MemoryFanout`] view of it, tagged with an instance name so an
//! instance never receives its own publications.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::errors::Result;
use crate::traits::{FanoutChannel, HistoryStore, PayloadStream};

/// Default bus capacity per subscriber.
const BUS_CAPACITY: usize = 1024;

/// Capped in-memory history.
pub struct MemoryHistory {
    limit: usize,
    rooms: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryHistory {
    /// Create a store keeping at most `limit` entries per room.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, room: &str, payload: &str) -> Result<()> {
        let mut rooms = self.rooms.lock();
        let log = rooms.entry(room.to_owned()).or_default();
        log.push_back(payload.to_owned());
        while log.len() > self.limit {
            let _ = log.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, room: &str) -> Result<Vec<String>> {
        Ok(self
            .rooms
            .lock()
            .get(room)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Clone, Debug)]
struct BusMessage {
    room: String,
    origin: Arc<str>,
    payload: String,
}

/// Shared in-process bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<BusMessage>,
    subscribers: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A fan-out endpoint for one instance.
    pub fn endpoint(&self, instance: impl Into<Arc<str>>) -> MemoryFanout {
        MemoryFanout {
            bus: self.clone(),
            instance: instance.into(),
        }
    }

    /// Live subscriptions for `room` across all endpoints.
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.subscribers.lock().get(room).copied().unwrap_or(0)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One instance's view of a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryFanout {
    bus: MemoryBus,
    instance: Arc<str>,
}

impl MemoryFanout {
    /// Live subscriptions for `room` on the underlying bus.
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.bus.subscriber_count(room)
    }
}

#[async_trait]
impl FanoutChannel for MemoryFanout {
    async fn publish(&self, room: &str, payload: &str) -> Result<()> {
        // No receivers is not an error: nobody else serves this room.
        let _ = self.bus.tx.send(BusMessage {
            room: room.to_owned(),
            origin: Arc::clone(&self.instance),
            payload: payload.to_owned(),
        });
        Ok(())
    }

    async fn subscribe(&self, room: &str) -> Result<PayloadStream> {
        let rx = self.bus.tx.subscribe();
        let guard = SubscriptionGuard::new(Arc::clone(&self.bus.subscribers), room);
        let room = room.to_owned();
        let instance = Arc::clone(&self.instance);

        let inner = BroadcastStream::new(rx)
            .filter_map(move |item| {
                let out = match item {
                    Ok(msg) if msg.room == room && msg.origin != instance => Some(msg.payload),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(room = %room, skipped, "fan-out subscriber lagged");
                        None
                    }
                };
                futures::future::ready(out)
            })
            .boxed();

        Ok(Tracked {
            inner,
            _guard: guard,
        }
        .boxed())
    }
}

struct SubscriptionGuard {
    counts: Arc<Mutex<HashMap<String, usize>>>,
    room: String,
}

impl SubscriptionGuard {
    fn new(counts: Arc<Mutex<HashMap<String, usize>>>, room: &str) -> Self {
        *counts.lock().entry(room.to_owned()).or_default() += 1;
        Self {
            counts,
            room: room.to_owned(),
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(n) = counts.get_mut(&self.room) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                let _ = counts.remove(&self.room);
            }
        }
    }
}

/// Stream wrapper that keeps the subscription counted while alive.
struct Tracked {
    inner: PayloadStream,
    _guard: SubscriptionGuard,
}

impl Stream for Tracked {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.inner.poll_next_unpin(cx)
    }
}
