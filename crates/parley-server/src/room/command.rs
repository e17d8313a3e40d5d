//! Messages accepted by a room hub.

use std::sync::Arc;

use parley_core::{ClientId, Phase, PlayerSnapshot};
use tokio::sync::oneshot;

use crate::websocket::connection::ClientHandle;

/// Where a broadcast payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A local client or the hub itself; mirrored to the fan-out channel.
    Local,
    /// Another instance, via the fan-out relay; delivered locally only.
    Relay,
}

/// Read-only view of a room, answered by the hub.
#[derive(Clone, Debug)]
pub struct RoomStatus {
    /// Current phase.
    pub phase: Phase,
    /// Members in join order.
    pub players: Vec<PlayerSnapshot>,
    /// Members that have signaled ready.
    pub ready_count: usize,
    /// Whether a fan-out relay is running.
    pub bridge_active: bool,
}

#[derive(Debug)]
pub(crate) enum RoomCommand {
    Register(ClientHandle),
    Unregister(ClientId),
    Broadcast { payload: Arc<str>, origin: Origin },
    Ready(ClientId),
    EndGame,
    Status(oneshot::Sender<RoomStatus>),
    /// The relay with this generation lost its subscription.
    RelayStopped(u64),
}
