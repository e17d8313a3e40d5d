//! Game-rule extension point.

use parley_core::{PlayerSnapshot, RoomCode};

/// Callbacks invoked by a room hub.
///
/// Hooks run inside the hub loop and must return quickly; spawn a task for
/// anything that waits.
pub trait GameHooks: Send + Sync {
    /// Every member signaled ready and the room moved to `InGame`.
    ///
    /// Called at most once per room lifetime.
    fn on_all_ready(&self, room: &RoomCode, players: &[PlayerSnapshot]);
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl GameHooks for NoopHooks {
    fn on_all_ready(&self, _room: &RoomCode, _players: &[PlayerSnapshot]) {}
}
