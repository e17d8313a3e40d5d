//! Room phase state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a room. Transitions only move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Lobby: waiting for every member to signal ready.
    #[default]
    Waiting,
    /// All members were ready at once; the game is running.
    InGame,
    /// Ended by external game logic.
    Ended,
}

impl Phase {
    /// Wire name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InGame => "inGame",
            Self::Ended => "ended",
        }
    }

    /// Whether moving to `next` is a legal forward step.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::InGame) | (Self::InGame, Self::Ended)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
