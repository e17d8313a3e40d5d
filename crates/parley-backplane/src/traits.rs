//! Backend traits consumed by the room hubs.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::Result;

/// Stream of raw payloads delivered by a fan-out subscription.
pub type PayloadStream = BoxStream<'static, String>;

/// Bounded per-room history log.
///
/// `room` is a normalized room code.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one payload, evicting the oldest entries beyond the limit.
    async fn append(&self, room: &str, payload: &str) -> Result<()>;

    /// Retained payloads, oldest first.
    async fn recent(&self, room: &str) -> Result<Vec<String>>;
}

/// Cross-instance broadcast channel.
#[async_trait]
pub trait FanoutChannel: Send + Sync {
    /// Publish a payload to every other instance serving `room`.
    async fn publish(&self, room: &str, payload: &str) -> Result<()>;

    /// Subscribe to payloads published for `room` by other instances.
    ///
    /// The stream ends when the underlying subscription is lost. Dropping it
    /// unsubscribes.
    async fn subscribe(&self, room: &str) -> Result<PayloadStream>;
}
