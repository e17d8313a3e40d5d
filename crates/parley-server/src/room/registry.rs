//! Room lookup and lazy creation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use parley_backplane::{Backplane, HistoryStore};
use parley_core::RoomCode;
use parley_settings::RoomSettings;
use serde::Serialize;
use tracing::info;

use super::handle::RoomHandle;
use super::hooks::{GameHooks, NoopHooks};
use super::hub::{self, HubDeps};

/// One row of the room directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    /// `"<code>|<code>"`.
    pub id: String,
    /// The room code.
    pub name: String,
    /// The room code.
    pub code: String,
    /// Connected members on this instance.
    pub count: usize,
}

/// Maps room codes to running hubs.
///
/// Hubs are created on first lookup and stay resident for the life of the
/// registry.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
    history: Option<Arc<dyn HistoryStore>>,
    deps: HubDeps,
}

impl RoomRegistry {
    /// Create a registry whose hubs use `backplane`.
    pub fn new(settings: &RoomSettings, backplane: Backplane) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history: backplane.history,
            deps: HubDeps {
                fanout: backplane.fanout,
                hooks: Arc::new(NoopHooks),
                command_capacity: settings.command_capacity,
                publish_capacity: settings.publish_capacity,
            },
        }
    }

    /// Install game hooks for rooms created from now on.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn GameHooks>) -> Self {
        self.deps.hooks = hooks;
        self
    }

    /// History store shared by sessions, if enabled.
    pub fn history(&self) -> Option<&Arc<dyn HistoryStore>> {
        self.history.as_ref()
    }

    /// Whether rooms mirror broadcasts to other instances.
    pub fn fanout_enabled(&self) -> bool {
        self.deps.fanout.is_some()
    }

    /// Look up a room without creating it.
    pub fn get(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.read().get(code).cloned()
    }

    /// Look up a room, spawning its hub on first use.
    ///
    /// Must be called within a Tokio runtime.
    pub fn get_or_create(&self, code: &RoomCode) -> RoomHandle {
        if let Some(handle) = self.rooms.read().get(code) {
            return handle.clone();
        }
        let mut rooms = self.rooms.write();
        rooms
            .entry(code.clone())
            .or_insert_with(|| {
                info!(room = %code, "room created");
                hub::spawn(code.clone(), self.deps.clone())
            })
            .clone()
    }

    /// Number of known rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Connected members across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.read().values().map(RoomHandle::occupancy).sum()
    }

    /// Directory of rooms sorted by code.
    pub fn roster(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self
            .rooms
            .read()
            .iter()
            .map(|(code, handle)| RoomSummary {
                id: format!("{code}|{code}"),
                name: code.to_string(),
                code: code.to_string(),
                count: handle.occupancy(),
            })
            .collect();
        summaries.sort_by(|a, b| a.code.cmp(&b.code));
        summaries
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.room_count())
            .field("history", &self.history.is_some())
            .field("fanout", &self.fanout_enabled())
            .finish_non_exhaustive()
    }
}
