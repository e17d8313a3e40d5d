//! Cloneable client of a room hub.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parley_core::{ClientId, RoomCode};
use tokio::sync::{mpsc, oneshot};

use super::command::{Origin, RoomCommand, RoomStatus};
use crate::errors::{Result, RoomError};
use crate::websocket::connection::ClientHandle;

/// Sends commands to one room's hub.
///
/// All methods wait for queue space, never for the hub to act, except
/// [`status`](Self::status) which waits for the answer.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    tx: mpsc::Sender<RoomCommand>,
    occupancy: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub(crate) fn new(code: RoomCode, tx: mpsc::Sender<RoomCommand>, occupancy: Arc<AtomicUsize>) -> Self {
        Self { code, tx, occupancy }
    }

    /// Room code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Members as last published by the hub.
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    /// Admit a client. The hub takes ownership of its outbound queue.
    pub async fn register(&self, client: ClientHandle) -> Result<()> {
        self.send(RoomCommand::Register(client)).await
    }

    /// Remove a client. Unknown IDs are ignored.
    pub async fn unregister(&self, id: ClientId) -> Result<()> {
        self.send(RoomCommand::Unregister(id)).await
    }

    /// Deliver a payload to every member and mirror it to other instances.
    pub async fn broadcast(&self, payload: impl Into<Arc<str>>) -> Result<()> {
        self.send(RoomCommand::Broadcast {
            payload: payload.into(),
            origin: Origin::Local,
        })
        .await
    }

    /// Record a ready signal.
    pub async fn ready(&self, id: ClientId) -> Result<()> {
        self.send(RoomCommand::Ready(id)).await
    }

    /// Move an in-game room to `ended`.
    pub async fn end_game(&self) -> Result<()> {
        self.send(RoomCommand::EndGame).await
    }

    /// Current phase, members and bridge state.
    pub async fn status(&self) -> Result<RoomStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Status(reply)).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    async fn send(&self, cmd: RoomCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| RoomError::Closed)
    }
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("code", &self.code)
            .field("occupancy", &self.occupancy())
            .finish_non_exhaustive()
    }
}
