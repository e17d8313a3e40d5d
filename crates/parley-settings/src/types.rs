//! Settings types. Every field has a default so partial files are valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Per-connection liveness and flow control.
    pub session: SessionSettings,
    /// Room hub queues.
    pub rooms: RoomSettings,
    /// History store and cross-instance fan-out.
    pub backplane: BackplaneSettings,
}

impl ParleySettings {
    /// Reject values that would make the relay misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.session.pong_wait_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session.pongWaitSecs must be at least 1".into(),
            ));
        }
        if self.session.write_wait_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session.writeWaitSecs must be at least 1".into(),
            ));
        }
        if self.session.send_queue_capacity == 0
            || self.rooms.command_capacity == 0
            || self.rooms.publish_capacity == 0
        {
            return Err(SettingsError::InvalidValue(
                "queue capacities must be at least 1".into(),
            ));
        }
        if self.backplane.history_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "backplane.historyLimit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Read deadline: the connection is dropped when nothing, not even a
    /// pong, arrives within this window.
    pub pong_wait_secs: u64,
    /// Deadline for a single outbound write.
    pub write_wait_secs: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Capacity of each client's outbound queue.
    pub send_queue_capacity: usize,
}

impl SessionSettings {
    /// Read deadline as a `Duration`.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Probe interval: nine tenths of the read deadline, so a ping is always
    /// in flight before the peer's deadline can lapse.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    /// Per-write deadline as a `Duration`.
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_size: 4 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Room hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Capacity of each room's command queue.
    pub command_capacity: usize,
    /// Capacity of the queue feeding a room's fan-out publisher.
    pub publish_capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            command_capacity: 128,
            publish_capacity: 128,
        }
    }
}

/// History store and fan-out settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackplaneSettings {
    /// Redis URL. Without it history is kept in process memory and fan-out
    /// is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// Record and replay room history.
    pub history_enabled: bool,
    /// Entries kept per room.
    pub history_limit: usize,
    /// Mirror broadcasts across instances (requires `redisUrl`).
    pub fanout_enabled: bool,
}

impl Default for BackplaneSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            history_enabled: true,
            history_limit: 50,
            fanout_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ParleySettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.session.pong_wait_secs, 60);
        assert_eq!(s.session.write_wait_secs, 10);
        assert_eq!(s.session.max_message_size, 4096);
        assert_eq!(s.session.send_queue_capacity, 256);
        assert_eq!(s.rooms.command_capacity, 128);
        assert_eq!(s.backplane.history_limit, 50);
        assert!(s.backplane.redis_url.is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn ping_period_is_nine_tenths_of_pong_wait() {
        let s = SessionSettings::default();
        assert_eq!(s.ping_period(), Duration::from_secs(54));
        let short = SessionSettings {
            pong_wait_secs: 1,
            ..SessionSettings::default()
        };
        assert_eq!(short.ping_period(), Duration::from_millis(900));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ParleySettings =
            serde_json::from_str(r#"{"session":{"pongWaitSecs":30}}"#).unwrap();
        assert_eq!(s.session.pong_wait_secs, 30);
        assert_eq!(s.session.write_wait_secs, 10);
        assert_eq!(s.server.port, 3000);
    }

    #[test]
    fn zero_pong_wait_is_invalid() {
        let mut s = ParleySettings::default();
        s.session.pong_wait_secs = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_queue_is_invalid() {
        let mut s = ParleySettings::default();
        s.rooms.publish_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn redis_url_omitted_when_unset() {
        let json = serde_json::to_value(BackplaneSettings::default()).unwrap();
        assert!(json.get("redisUrl").is_none());
        assert_eq!(json["historyLimit"], 50);
    }
}
