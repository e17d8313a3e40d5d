//! WebSocket session lifecycle: one inbound and one outbound pump per client.
//!
//! 1. Queue a `hello` envelope and the room history for the client
//! 2. Register the client with its room hub
//! 3. Inbound pump: frames → ready signals or room broadcasts
//! 4. Outbound pump: queued payloads and keepalive pings → socket
//! 5. On inbound exit, unregister; the hub drops the queue sender, the
//!    outbound pump sends a close frame and stops

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use parley_backplane::HistoryStore;
use parley_core::{ClientId, Envelope, EventType};
use parley_settings::SessionSettings;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientHandle;
use crate::metrics::{
    HISTORY_ERRORS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::room::RoomHandle;

/// Why a pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer closed the connection.
    Closed,
    /// Nothing arrived within the read deadline.
    TimedOut,
    /// The transport reported an error.
    ReadError,
    /// A frame exceeded the size limit.
    Oversized,
    /// The room hub is gone.
    RoomGone,
    /// The hub closed the client's queue.
    QueueClosed,
    /// A write failed or missed its deadline.
    WriteError,
}

/// Everything a session needs besides its socket.
#[derive(Clone)]
pub struct SessionContext {
    /// The room being joined.
    pub room: RoomHandle,
    /// History store, if enabled.
    pub history: Option<Arc<dyn HistoryStore>>,
    /// Liveness and flow-control settings.
    pub settings: SessionSettings,
}

/// Run a session for an upgraded socket until the connection ends.
#[instrument(skip_all, fields(room = %ctx.room.code(), client_id = %client_id))]
pub async fn run_ws_session(socket: WebSocket, ctx: SessionContext, client_id: ClientId, name: String) {
    let started = Instant::now();
    info!(name = %name, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (client, queue) = ClientHandle::new(client_id.clone(), name, ctx.settings.send_queue_capacity);
    greet(&client, &ctx).await;

    if ctx.room.register(client).await.is_err() {
        warn!("room closed before registration");
    } else {
        let (sink, stream) = socket.split();
        let settings = ctx.settings.clone();
        let mut outbound = tokio::spawn(async move { outbound_pump(sink, queue, &settings).await });

        let inbound = inbound_pump(stream, &ctx, &client_id);
        let mut outbound_done = false;
        let exit = tokio::select! {
            exit = inbound => exit,
            res = &mut outbound => {
                outbound_done = true;
                res.unwrap_or(PumpExit::WriteError)
            }
        };
        debug!(?exit, "session pump finished");

        if ctx.room.unregister(client_id.clone()).await.is_err() {
            debug!("room closed before unregistration");
        }
        if !outbound_done {
            match timeout(ctx.settings.write_wait(), &mut outbound).await {
                Ok(Ok(out)) => debug!(exit = ?out, "outbound pump finished"),
                Ok(Err(e)) => warn!(error = %e, "outbound pump panicked"),
                Err(_) => outbound.abort(),
            }
        }
    }

    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Queue the `hello` envelope followed by the room history, oldest first.
async fn greet(client: &ClientHandle, ctx: &SessionContext) {
    let hello = Envelope::new(
        EventType::Hello,
        json!({
            "room": ctx.room.code(),
            "name": client.name(),
            "id": client.id(),
            "role": client.role(),
        }),
    );
    let _ = client.send_envelope(&hello);

    let Some(history) = &ctx.history else { return };
    match timeout(ctx.settings.write_wait(), history.recent(ctx.room.code().as_str())).await {
        Ok(Ok(entries)) => {
            debug!(entries = entries.len(), "replaying history");
            for entry in entries {
                let _ = client.send(Arc::from(entry));
            }
        }
        Ok(Err(e)) => {
            counter!(HISTORY_ERRORS_TOTAL).increment(1);
            warn!(error = %e, "history replay failed");
        }
        Err(_) => {
            counter!(HISTORY_ERRORS_TOTAL).increment(1);
            warn!("history replay timed out");
        }
    }
}

/// Read frames until the connection ends.
///
/// The read deadline is re-armed by every frame, keepalive pongs included.
/// Undecodable frames are skipped. Ready signals go to the hub; everything
/// else is broadcast verbatim and appended to history.
pub async fn inbound_pump<S, E>(mut stream: S, ctx: &SessionContext, client_id: &ClientId) -> PumpExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let deadline = ctx.settings.pong_wait();
    loop {
        let frame = match timeout(deadline, stream.next()).await {
            Err(_) => return PumpExit::TimedOut,
            Ok(None) => return PumpExit::Closed,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "websocket read error");
                return PumpExit::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => Utf8Bytes::from(text.to_owned()),
                Err(_) => {
                    debug!("non-UTF8 binary frame, skipping");
                    continue;
                }
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return PumpExit::Closed,
        };

        let len = text.as_str().len();
        if len > ctx.settings.max_message_size {
            warn!(len, max = ctx.settings.max_message_size, "frame too large");
            return PumpExit::Oversized;
        }

        if let Err(exit) = handle_frame(text.as_str(), ctx, client_id).await {
            return exit;
        }
    }
}

async fn handle_frame(text: &str, ctx: &SessionContext, client_id: &ClientId) -> Result<(), PumpExit> {
    let kind = match Envelope::peek_type(text) {
        Ok(kind) => kind,
        Err(e) => {
            debug!(error = %e, "undecodable frame, skipping");
            return Ok(());
        }
    };

    if kind.as_deref().and_then(EventType::parse) == Some(EventType::Ready) {
        return ctx
            .room
            .ready(client_id.clone())
            .await
            .map_err(|_| PumpExit::RoomGone);
    }

    let payload: Arc<str> = Arc::from(text);
    ctx.room
        .broadcast(Arc::clone(&payload))
        .await
        .map_err(|_| PumpExit::RoomGone)?;

    if let Some(history) = &ctx.history {
        let code = ctx.room.code().as_str();
        match timeout(ctx.settings.write_wait(), history.append(code, &payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                counter!(HISTORY_ERRORS_TOTAL).increment(1);
                warn!(error = %e, "history append failed");
            }
            Err(_) => {
                counter!(HISTORY_ERRORS_TOTAL).increment(1);
                warn!("history append timed out");
            }
        }
    }
    Ok(())
}

/// Drain the client's queue to the socket and keep the connection alive.
///
/// Pings go out every `ping_period`; every write is bounded by
/// `write_wait`. When the queue closes a close frame is sent.
pub async fn outbound_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Arc<str>>,
    settings: &SessionSettings,
) -> PumpExit
where
    S: Sink<Message> + Unpin,
{
    let write_wait = settings.write_wait();
    let mut ping = tokio::time::interval(settings.ping_period());
    // Skip the immediate first tick.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(payload) = next else {
                    let _ = timeout(write_wait, sink.send(Message::Close(None))).await;
                    return PumpExit::QueueClosed;
                };
                let frame = Message::Text(Utf8Bytes::from(&*payload));
                if !write(&mut sink, frame, write_wait).await {
                    return PumpExit::WriteError;
                }
            }
            _ = ping.tick() => {
                if !write(&mut sink, Message::Ping(Bytes::new()), write_wait).await {
                    return PumpExit::WriteError;
                }
            }
        }
    }
}

async fn write<S>(sink: &mut S, frame: Message, deadline: std::time::Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    matches!(timeout(deadline, sink.send(frame)).await, Ok(Ok(())))
}
