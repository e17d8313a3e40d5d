//! Cross-instance fan-out for one room.
//!
//! While a room has members its hub keeps one [`Bridge`], which owns two
//! tasks:
//!
//! - the **publisher**, draining a bounded queue of local broadcasts into the
//!   fan-out channel, so the hub never waits on the network;
//! - the **relay**, subscribed to the room's channel and re-injecting payloads
//!   from other instances into the hub as [`Origin::Relay`] broadcasts.
//!
//! The relay holds only a weak sender to the hub. If its subscription fails
//! or ends it reports [`RoomCommand::RelayStopped`] with its generation and
//! the hub re-arms it with [`Bridge::restart_relay`] after a backoff. The
//! publisher is unaffected, so local broadcasts keep flowing out meanwhile.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use parley_backplane::FanoutChannel;
use parley_core::RoomCode;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::command::{Origin, RoomCommand};
use crate::metrics::ROOM_FANOUT_PUBLISH_ERRORS_TOTAL;

/// First resubscribe delay after a lost relay; doubles per consecutive loss.
const RELAY_RETRY_BASE: Duration = Duration::from_millis(100);
/// Resubscribe delay ceiling.
const RELAY_RETRY_MAX: Duration = Duration::from_secs(5);
/// A relay that stayed up this long resets the backoff.
const RELAY_HEALTHY_AFTER: Duration = Duration::from_secs(30);

pub(crate) struct Bridge {
    room: RoomCode,
    fanout: Arc<dyn FanoutChannel>,
    hub: mpsc::WeakSender<RoomCommand>,
    generation: u64,
    restarts: u32,
    relay_started: Instant,
    cancel: CancellationToken,
    publish_tx: mpsc::Sender<Arc<str>>,
    relay: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl Bridge {
    pub(crate) fn start(
        room: RoomCode,
        fanout: Arc<dyn FanoutChannel>,
        hub: mpsc::WeakSender<RoomCommand>,
        generation: u64,
        publish_capacity: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (publish_tx, publish_rx) = mpsc::channel(publish_capacity.max(1));

        let relay = tokio::spawn(relay_loop(
            room.clone(),
            Arc::clone(&fanout),
            hub.clone(),
            cancel.clone(),
            generation,
            Duration::ZERO,
        ));
        let publisher = tokio::spawn(publish_loop(room.clone(), Arc::clone(&fanout), publish_rx));

        Self {
            room,
            fanout,
            hub,
            generation,
            restarts: 0,
            relay_started: Instant::now(),
            cancel,
            publish_tx,
            relay,
            publisher,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Spawn a fresh relay under `generation` after a backoff delay.
    ///
    /// The publisher and its queue are kept. Returns the delay used.
    pub(crate) fn restart_relay(&mut self, generation: u64) -> Duration {
        if self.relay_started.elapsed() >= RELAY_HEALTHY_AFTER {
            self.restarts = 0;
        }
        self.restarts = self.restarts.saturating_add(1);
        let delay = retry_delay(self.restarts);

        self.relay.abort();
        self.generation = generation;
        self.relay_started = Instant::now() + delay;
        self.relay = tokio::spawn(relay_loop(
            self.room.clone(),
            Arc::clone(&self.fanout),
            self.hub.clone(),
            self.cancel.clone(),
            generation,
            delay,
        ));
        delay
    }

    /// Hand a payload to the publisher without waiting.
    pub(crate) fn publish(&self, payload: &Arc<str>) {
        match self.publish_tx.try_send(Arc::clone(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!(ROOM_FANOUT_PUBLISH_ERRORS_TOTAL).increment(1);
                warn!(generation = self.generation, "fan-out publish queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(generation = self.generation, "fan-out publisher gone");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.relay.is_finished()
    }

    /// Stop the relay. Queued publications are still flushed.
    pub(crate) fn stop(self) {
        self.cancel.cancel();
        // The publisher exits once the queue drains and its sender is gone.
        drop(self.publish_tx);
        drop(self.publisher);
    }
}

/// Backoff for the `attempt`-th consecutive relay loss, starting at 1.
fn retry_delay(attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(16);
    RELAY_RETRY_BASE
        .saturating_mul(1 << doublings)
        .min(RELAY_RETRY_MAX)
}

#[instrument(skip_all, fields(room = %room, generation = generation))]
async fn relay_loop(
    room: RoomCode,
    fanout: Arc<dyn FanoutChannel>,
    hub: mpsc::WeakSender<RoomCommand>,
    cancel: CancellationToken,
    generation: u64,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }

    // Cancellation wins every race: a stopped relay injects nothing more.
    let subscribed = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        res = fanout.subscribe(room.as_str()) => res,
    };
    let mut stream = match subscribed {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "fan-out subscribe failed");
            report_stopped(&hub, generation).await;
            return;
        }
    };
    debug!("fan-out relay started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = stream.next() => {
                let Some(payload) = next else {
                    warn!("fan-out subscription ended");
                    report_stopped(&hub, generation).await;
                    return;
                };
                let Some(tx) = hub.upgrade() else { break };
                let cmd = RoomCommand::Broadcast {
                    payload: Arc::from(payload),
                    origin: Origin::Relay,
                };
                if tx.send(cmd).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("fan-out relay stopped");
}

async fn report_stopped(hub: &mpsc::WeakSender<RoomCommand>, generation: u64) {
    if let Some(tx) = hub.upgrade() {
        let _ = tx.send(RoomCommand::RelayStopped(generation)).await;
    }
}

async fn publish_loop(
    room: RoomCode,
    fanout: Arc<dyn FanoutChannel>,
    mut rx: mpsc::Receiver<Arc<str>>,
) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = fanout.publish(room.as_str(), &payload).await {
            counter!(ROOM_FANOUT_PUBLISH_ERRORS_TOTAL).increment(1);
            warn!(room = %room, error = %e, "fan-out publish failed");
        }
    }
}
