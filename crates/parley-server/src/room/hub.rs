//! The per-room event loop.
//!
//! One task per room consumes [`RoomCommand`]s in order and is the only
//! writer of the room's [`RoomState`]. Command handling never awaits:
//! client delivery is `try_send` and fan-out publishing goes through the
//! bridge's bounded queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parley_backplane::FanoutChannel;
use parley_core::{
    ClientId, Envelope, EventType, JoinNotice, Phase, PhaseNotice, ReadyNotice, RoomCode,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::bridge::Bridge;
use super::command::{Origin, RoomCommand, RoomStatus};
use super::handle::RoomHandle;
use super::hooks::GameHooks;
use super::state::{ReadyOutcome, RoomState};
use crate::websocket::connection::ClientHandle;

/// Collaborators shared by every hub a registry spawns.
#[derive(Clone)]
pub(crate) struct HubDeps {
    pub fanout: Option<Arc<dyn FanoutChannel>>,
    pub hooks: Arc<dyn GameHooks>,
    pub command_capacity: usize,
    pub publish_capacity: usize,
}

pub(crate) struct RoomHub {
    code: RoomCode,
    state: RoomState,
    rx: mpsc::Receiver<RoomCommand>,
    weak_tx: mpsc::WeakSender<RoomCommand>,
    deps: HubDeps,
    bridge: Option<Bridge>,
    generation: u64,
    occupancy: Arc<AtomicUsize>,
}

/// Spawn a hub for `code` and return its handle.
///
/// The loop runs until every handle is dropped.
pub(crate) fn spawn(code: RoomCode, deps: HubDeps) -> RoomHandle {
    let (tx, rx) = mpsc::channel(deps.command_capacity.max(1));
    let occupancy = Arc::new(AtomicUsize::new(0));
    let hub = RoomHub {
        code: code.clone(),
        state: RoomState::new(),
        rx,
        weak_tx: tx.downgrade(),
        deps,
        bridge: None,
        generation: 0,
        occupancy: Arc::clone(&occupancy),
    };
    let _ = tokio::spawn(hub.run());
    RoomHandle::new(code, tx, occupancy)
}

impl RoomHub {
    async fn run(mut self) {
        debug!(room = %self.code, "room hub started");
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        self.stop_bridge();
        debug!(room = %self.code, "room hub stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Register(client) => self.register(client),
            RoomCommand::Unregister(id) => self.unregister(&id),
            RoomCommand::Broadcast { payload, origin } => self.broadcast(&payload, origin),
            RoomCommand::Ready(id) => self.ready(&id),
            RoomCommand::EndGame => self.end_game(),
            RoomCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            RoomCommand::RelayStopped(generation) => self.relay_stopped(generation),
        }
    }

    fn register(&mut self, client: ClientHandle) {
        let notice = JoinNotice {
            id: client.id().clone(),
            name: client.name().to_owned(),
        };
        if let Err(dup) = self.state.admit(client) {
            warn!(room = %self.code, client_id = %dup.id(), "client already registered");
            return;
        }
        self.sync_occupancy();
        self.ensure_bridge();
        info!(room = %self.code, client_id = %notice.id, members = self.state.len(), "client joined");

        self.notify(EventType::Join, &notice);
        self.broadcast_state();
    }

    fn unregister(&mut self, id: &ClientId) {
        let Some(client) = self.state.remove(id) else {
            debug!(room = %self.code, client_id = %id, "unregister for unknown client");
            return;
        };
        let notice = JoinNotice {
            id: client.id().clone(),
            name: client.name().to_owned(),
        };
        info!(
            room = %self.code,
            client_id = %id,
            dropped = client.drop_count(),
            members = self.state.len(),
            "client left"
        );
        // Closes the client's outbound queue.
        drop(client);
        self.sync_occupancy();

        if self.state.is_empty() {
            self.stop_bridge();
            return;
        }
        self.notify(EventType::Leave, &notice);
        self.broadcast_state();
        self.evaluate_gate();
    }

    fn broadcast(&self, payload: &Arc<str>, origin: Origin) {
        let missed = self.state.deliver_all(payload);
        if missed > 0 {
            debug!(room = %self.code, missed, "broadcast dropped for saturated clients");
        }
        if origin == Origin::Local {
            if let Some(bridge) = &self.bridge {
                bridge.publish(payload);
            }
        }
    }

    fn ready(&mut self, id: &ClientId) {
        match self.state.mark_ready(id) {
            ReadyOutcome::Marked(username) => {
                debug!(room = %self.code, client_id = %id, ready = self.state.ready_count(), "client ready");
                let notice = ReadyNotice {
                    id: id.clone(),
                    username,
                };
                self.notify(EventType::Ready, &notice);
                self.broadcast_state();
                self.evaluate_gate();
            }
            ReadyOutcome::AlreadyReady | ReadyOutcome::Unknown => {}
        }
    }

    fn evaluate_gate(&mut self) {
        if !self.state.try_start() {
            return;
        }
        info!(room = %self.code, players = self.state.len(), "all players ready, game started");
        self.notify(EventType::Phase, &PhaseNotice { status: Phase::InGame });
        let players = self.state.players();
        self.deps.hooks.on_all_ready(&self.code, &players);
    }

    fn end_game(&mut self) {
        if self.state.end() {
            info!(room = %self.code, "game ended");
            self.notify(EventType::Phase, &PhaseNotice { status: Phase::Ended });
        } else {
            debug!(room = %self.code, phase = %self.state.phase(), "end ignored");
        }
    }

    fn status(&self) -> RoomStatus {
        RoomStatus {
            phase: self.state.phase(),
            players: self.state.players(),
            ready_count: self.state.ready_count(),
            bridge_active: self.bridge.as_ref().is_some_and(Bridge::is_running),
        }
    }

    /// Re-arm a lost relay. The publisher keeps running throughout.
    fn relay_stopped(&mut self, generation: u64) {
        if self.bridge.as_ref().map(Bridge::generation) != Some(generation) {
            return;
        }
        if self.state.is_empty() {
            self.stop_bridge();
            return;
        }
        self.generation += 1;
        let next = self.generation;
        if let Some(bridge) = &mut self.bridge {
            let delay = bridge.restart_relay(next);
            warn!(room = %self.code, lost = generation, next, ?delay, "fan-out relay lost, resubscribing");
        }
    }

    fn ensure_bridge(&mut self) {
        if self.bridge.is_some() {
            return;
        }
        let Some(fanout) = &self.deps.fanout else {
            return;
        };
        self.generation += 1;
        self.bridge = Some(Bridge::start(
            self.code.clone(),
            Arc::clone(fanout),
            self.weak_tx.clone(),
            self.generation,
            self.deps.publish_capacity,
        ));
        debug!(room = %self.code, generation = self.generation, "fan-out bridge activated");
    }

    fn stop_bridge(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            debug!(room = %self.code, generation = bridge.generation(), "fan-out bridge deactivated");
            bridge.stop();
        }
    }

    fn broadcast_state(&self) {
        let snapshot = self.state.snapshot(&self.code);
        match snapshot.to_envelope() {
            Ok(envelope) => self.broadcast_envelope(&envelope),
            Err(e) => warn!(room = %self.code, error = %e, "failed to build state snapshot"),
        }
    }

    fn notify<T: Serialize>(&self, kind: EventType, data: &T) {
        match Envelope::with_data(kind, data) {
            Ok(envelope) => self.broadcast_envelope(&envelope),
            Err(e) => warn!(room = %self.code, kind = kind.as_str(), error = %e, "failed to build notice"),
        }
    }

    fn broadcast_envelope(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(json) => self.broadcast(&Arc::from(json), Origin::Local),
            Err(e) => warn!(room = %self.code, error = %e, "failed to encode envelope"),
        }
    }

    fn sync_occupancy(&self) {
        self.occupancy.store(self.state.len(), Ordering::Relaxed);
    }
}
