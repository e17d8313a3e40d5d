//! # parley-server
//!
//! Room hubs, the fan-out bridge and the Axum surface of the Parley relay.
//!
//! - **Rooms**: one event loop per room serializes membership, readiness and
//!   phase changes; delivery to clients never blocks the loop
//! - **Bridge**: optional per-room pub/sub relay so several processes can
//!   serve one logical room
//! - **Sessions**: an inbound and an outbound pump per WebSocket, with
//!   read deadlines, keepalive pings and bounded writes
//! - **HTTP**: `/ws`, `/rooms`, `/health`, `/metrics`, graceful shutdown

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod metrics;
pub mod room;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::{Result, RoomError};
pub use room::{GameHooks, NoopHooks, RoomHandle, RoomRegistry, RoomStatus, RoomSummary};
pub use server::ParleyServer;
pub use shutdown::Shutdown;
