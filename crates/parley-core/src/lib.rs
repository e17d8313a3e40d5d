//! # parley-core
//!
//! Shared vocabulary for the Parley relay:
//!
//! - **IDs**: [`ClientId`] (UUID v7) and the case-normalized [`RoomCode`]
//! - **Envelope**: the generic `{type, data}` frame exchanged over the wire
//!   and over the cross-instance fan-out channel
//! - **Snapshots**: [`PlayerSnapshot`] / [`StateSnapshot`] projections of room
//!   membership, plus the small notice payloads the hub emits
//! - **Phase / Role**: the room state machine and cosmetic player roles

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod ids;
pub mod phase;
pub mod player;
pub mod snapshot;

pub use envelope::{Envelope, EventType};
pub use errors::{CoreError, Result};
pub use ids::{ClientId, MAX_ROOM_CODE_LEN, RoomCode};
pub use phase::Phase;
pub use player::{Role, display_name};
pub use snapshot::{JoinNotice, PhaseNotice, PlayerSnapshot, ReadyNotice, StateSnapshot};
