//! Redis-backed history and fan-out.
//!
//! Key layout, with `CODE` a normalized room code:
//!
//! | Key / channel              | Use                                     |
//! |----------------------------|-----------------------------------------|
//! | `room:CODE`                | list of recent payloads (RPUSH + LTRIM) |
//! | `room:CODE:pub:<instance>` | channel one instance publishes on       |
//! | `room:CODE:pub:*`          | pattern every instance subscribes to    |
//!
//! Publishing on an instance-scoped channel lets a subscriber drop its own
//! messages, so local clients are not served twice.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::traits::{FanoutChannel, HistoryStore, PayloadStream};

/// History list key for a room.
pub fn history_key(room: &str) -> String {
    format!("room:{room}")
}

/// Channel an instance publishes a room's broadcasts on.
pub fn publish_channel(room: &str, instance: &str) -> String {
    format!("room:{room}:pub:{instance}")
}

/// Pattern matching every instance's channel for a room.
pub fn subscribe_pattern(room: &str) -> String {
    format!("room:{room}:pub:*")
}

/// Redis implementation of [`HistoryStore`] and [`FanoutChannel`].
#[derive(Clone)]
pub struct RedisBackplane {
    client: redis::Client,
    conn: ConnectionManager,
    instance: String,
    history_limit: usize,
}

impl RedisBackplane {
    /// Connect to `url`. Fails if the server is unreachable.
    pub async fn connect(url: &str, instance: &str, history_limit: usize) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!(instance, "connected to redis");
        Ok(Self {
            client,
            conn,
            instance: instance.to_owned(),
            history_limit: history_limit.max(1),
        })
    }
}

#[async_trait]
impl HistoryStore for RedisBackplane {
    async fn append(&self, room: &str, payload: &str) -> Result<()> {
        let key = history_key(room);
        let keep = i64::try_from(self.history_limit).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(&key)
            .arg(payload)
            .ignore()
            .cmd("LTRIM")
            .arg(&key)
            .arg(-keep)
            .arg(-1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn recent(&self, room: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let entries = redis::cmd("LRANGE")
            .arg(history_key(room))
            .arg(0)
            .arg(-1)
            .query_async::<Vec<String>>(&mut conn)
            .await?;
        Ok(entries)
    }
}

#[async_trait]
impl FanoutChannel for RedisBackplane {
    async fn publish(&self, room: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PUBLISH")
            .arg(publish_channel(room, &self.instance))
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, room: &str) -> Result<PayloadStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(subscribe_pattern(room)).await?;
        debug!(room, "subscribed to fan-out pattern");

        let own = publish_channel(room, &self.instance);
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let out = if msg.get_channel_name() == own {
                None
            } else {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(channel = msg.get_channel_name(), error = %e, "undecodable fan-out payload");
                        None
                    }
                }
            };
            futures::future::ready(out)
        });
        Ok(stream.boxed())
    }
}
