//! Rooms: the hub loop, its handle, the fan-out bridge and the registry.

mod bridge;
pub mod command;
pub mod handle;
pub mod hooks;
mod hub;
pub mod registry;
pub mod state;

pub use command::{Origin, RoomStatus};
pub use handle::RoomHandle;
pub use hooks::{GameHooks, NoopHooks};
pub use registry::{RoomRegistry, RoomSummary};
pub use state::{ReadyOutcome, RoomState};
