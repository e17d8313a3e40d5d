//! WebSocket client handling.

pub mod connection;
pub mod session;
