//! The `{type, data}` envelope and the recognized event types.
//!
//! Inbound frames are decoded loosely: the relay only needs the `type` field
//! to recognize the ready signal, everything else is forwarded verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types understood by the relay and its browser client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Server greeting sent to a freshly connected client.
    Hello,
    /// A member joined the room.
    Join,
    /// A member left the room.
    Leave,
    /// Chat text (bidirectional).
    Chat,
    /// Readiness signal (client → server) and its notice (server → clients).
    Ready,
    /// Phase change notice.
    Phase,
    /// Room membership snapshot.
    State,
    /// Voting round started.
    VoteStart,
    /// Voting round ended.
    VoteEnd,
    /// Game over.
    End,
}

impl EventType {
    /// Wire name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat => "chat",
            Self::Ready => "ready",
            Self::Phase => "phase",
            Self::State => "state",
            Self::VoteStart => "vote_start",
            Self::VoteEnd => "vote_end",
            Self::End => "end",
        }
    }

    /// Look up a wire name. `agree` is accepted as a legacy alias of `ready`.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "hello" => Self::Hello,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "chat" => Self::Chat,
            "ready" | "agree" => Self::Ready,
            "phase" => Self::Phase,
            "state" => Self::State,
            "vote_start" => Self::VoteStart,
            "vote_end" => Self::VoteEnd,
            "end" => Self::End,
            _ => return None,
        };
        Some(kind)
    }
}

/// Generic wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type name. Kept as a string so unknown types pass through.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope for a known event type.
    pub fn new(kind: EventType, data: Value) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            data,
        }
    }

    /// Build an envelope from any serializable payload.
    pub fn with_data<T: Serialize>(kind: EventType, data: &T) -> serde_json::Result<Self> {
        Ok(Self::new(kind, serde_json::to_value(data)?))
    }

    /// The recognized event type, if any.
    pub fn event_type(&self) -> Option<EventType> {
        EventType::parse(&self.kind)
    }

    /// Serialize to the JSON text sent over the wire.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Read only the `type` field from an inbound frame.
    ///
    /// Frames must be JSON objects; anything else is a decode error. A missing
    /// or non-string `type` yields `Ok(None)`.
    pub fn peek_type(frame: &str) -> serde_json::Result<Option<String>> {
        let map: serde_json::Map<String, Value> = serde_json::from_str(frame)?;
        Ok(map
            .get("type")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }
}
