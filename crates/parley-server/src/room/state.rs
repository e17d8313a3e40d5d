//! Membership, readiness and phase of one room.
//!
//! Pure state with no I/O; the hub loop is its only owner. Every mutation
//! keeps `ready_count <= members.len()` and the per-member ready flags in
//! agreement with the counter.

use std::sync::Arc;

use parley_core::{ClientId, Phase, PlayerSnapshot, RoomCode, StateSnapshot};

use crate::websocket::connection::ClientHandle;

struct Member {
    client: ClientHandle,
    ready: bool,
}

/// Result of a ready signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// First signal from this member; carries its display name.
    Marked(String),
    /// The member had already signaled.
    AlreadyReady,
    /// No such member.
    Unknown,
}

/// Room state owned by the hub.
#[derive(Default)]
pub struct RoomState {
    members: Vec<Member>,
    ready_count: usize,
    phase: Phase,
    game_started: bool,
}

impl RoomState {
    /// Empty room in the waiting phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members that have signaled ready.
    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.members.iter().any(|m| m.client.id() == id)
    }

    /// Add a member at the end of the join order.
    ///
    /// A client whose ID is already present is handed back unchanged.
    pub fn admit(&mut self, client: ClientHandle) -> Result<(), ClientHandle> {
        if self.contains(client.id()) {
            return Err(client);
        }
        self.members.push(Member {
            client,
            ready: false,
        });
        Ok(())
    }

    /// Remove a member, returning its handle. Unknown IDs are a no-op.
    pub fn remove(&mut self, id: &ClientId) -> Option<ClientHandle> {
        let index = self.members.iter().position(|m| m.client.id() == id)?;
        let member = self.members.remove(index);
        if member.ready {
            self.ready_count = self.ready_count.saturating_sub(1);
        }
        Some(member.client)
    }

    /// Record a ready signal.
    pub fn mark_ready(&mut self, id: &ClientId) -> ReadyOutcome {
        let Some(member) = self.members.iter_mut().find(|m| m.client.id() == id) else {
            return ReadyOutcome::Unknown;
        };
        if member.ready {
            return ReadyOutcome::AlreadyReady;
        }
        member.ready = true;
        self.ready_count += 1;
        ReadyOutcome::Marked(member.client.name().to_owned())
    }

    /// Every member is ready and there is at least one.
    pub fn all_ready(&self) -> bool {
        !self.members.is_empty() && self.ready_count == self.members.len()
    }

    /// Start the game if the gate is open and it has never started.
    ///
    /// Returns `true` exactly once per room lifetime.
    pub fn try_start(&mut self) -> bool {
        if self.game_started || !self.all_ready() || !self.phase.can_advance_to(Phase::InGame) {
            return false;
        }
        self.phase = Phase::InGame;
        self.game_started = true;
        true
    }

    /// Move an in-game room to `Ended`. Returns whether the phase changed.
    pub fn end(&mut self) -> bool {
        if !self.phase.can_advance_to(Phase::Ended) {
            return false;
        }
        self.phase = Phase::Ended;
        true
    }

    /// Player projections in join order.
    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.members
            .iter()
            .map(|m| m.client.snapshot(m.ready))
            .collect()
    }

    /// Fresh membership snapshot.
    pub fn snapshot(&self, room: &RoomCode) -> StateSnapshot {
        StateSnapshot {
            room: room.clone(),
            players: self.players(),
        }
    }

    /// Offer `payload` to every member's queue without waiting.
    ///
    /// Returns the number of members that missed it.
    pub fn deliver_all(&self, payload: &Arc<str>) -> usize {
        self.members
            .iter()
            .filter(|m| !m.client.send(Arc::clone(payload)))
            .count()
    }
}
