//! # parley-backplane
//!
//! Storage and messaging backends shared by room hubs.
//!
//! - [`HistoryStore`]: bounded per-room log of broadcast payloads, replayed
//!   to late joiners.
//! - [`FanoutChannel`]: per-room pub/sub that mirrors broadcasts between
//!   relay instances.
//!
//! Two implementations are provided. The in-memory backends serve a single
//! instance and tests; [`RedisBackplane`] implements both traits on top of
//! Redis lists and pattern subscriptions.

#![deny(unsafe_code)]

pub mod bundle;
pub mod errors;
pub mod memory;
pub mod redis_backplane;
pub mod traits;

pub use bundle::Backplane;
pub use errors::{BackplaneError, Result};
pub use memory::{MemoryBus, MemoryFanout, MemoryHistory};
pub use redis_backplane::RedisBackplane;
pub use traits::{FanoutChannel, HistoryStore, PayloadStream};
