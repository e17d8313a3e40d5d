//! Point-in-time projections of room membership and the notice payloads the
//! hub broadcasts alongside them.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, EventType};
use crate::ids::{ClientId, RoomCode};
use crate::phase::Phase;

/// Display projection of one client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Client ID.
    pub id: ClientId,
    /// Display name.
    pub name: String,
    /// Liveness flag (game-level, not connection-level).
    pub alive: bool,
    /// Whether the client has signaled ready.
    pub ready: bool,
}

/// Membership snapshot of one room, broadcast as a `state` envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Room code.
    pub room: RoomCode,
    /// Players in join order.
    pub players: Vec<PlayerSnapshot>,
}

impl StateSnapshot {
    /// Wrap into a `state` envelope.
    pub fn to_envelope(&self) -> serde_json::Result<Envelope> {
        Envelope::with_data(EventType::State, self)
    }
}

/// Payload of `join` and `leave` notices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNotice {
    /// Client ID.
    pub id: ClientId,
    /// Display name.
    pub name: String,
}

/// Payload of the `ready` notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyNotice {
    /// Client ID.
    pub id: ClientId,
    /// Display name.
    pub username: String,
}

/// Payload of the `phase` notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseNotice {
    /// The phase the room moved to.
    pub status: Phase,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn player(name: &str, ready: bool) -> PlayerSnapshot {
        PlayerSnapshot {
            id: ClientId::new(),
            name: name.into(),
            alive: true,
            ready,
        }
    }

    #[test]
    fn state_envelope_shape() {
        let snap = StateSnapshot {
            room: RoomCode::parse("abcd").unwrap(),
            players: vec![player("Zed", false)],
        };
        let json = snap.to_envelope().unwrap().encode().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "state");
        assert_eq!(parsed["data"]["room"], "ABCD");
        let players = parsed["data"]["players"].as_array().unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0]["name"], "Zed");
        assert_eq!(players[0]["alive"], true);
        assert_eq!(players[0]["ready"], false);
        assert!(players[0]["id"].is_string());
    }

    #[test]
    fn empty_room_has_empty_player_list() {
        let snap = StateSnapshot {
            room: RoomCode::parse("x").unwrap(),
            players: Vec::new(),
        };
        let parsed: Value = serde_json::to_value(&snap).unwrap();
        assert_eq!(parsed["players"], Value::Array(Vec::new()));
    }

    #[test]
    fn phase_notice_uses_status_field() {
        let env = Envelope::with_data(EventType::Phase, &PhaseNotice { status: Phase::InGame }).unwrap();
        assert_eq!(env.data["status"], "inGame");
    }
}
