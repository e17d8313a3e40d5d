//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Rooms known to this instance.
    pub rooms: usize,
    /// Clients connected to this instance.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, rooms: usize, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        rooms,
        connections,
    }
}
