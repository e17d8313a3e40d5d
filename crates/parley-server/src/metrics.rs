//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections currently open (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Payloads dropped because a client queue was full (counter).
pub const ROOM_BROADCAST_DROPS_TOTAL: &str = "room_broadcast_drops_total";
/// Fan-out publications that failed or were shed (counter).
pub const ROOM_FANOUT_PUBLISH_ERRORS_TOTAL: &str = "room_fanout_publish_errors_total";
/// History appends or reads that failed or timed out (counter).
pub const HISTORY_ERRORS_TOTAL: &str = "history_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(ROOM_BROADCAST_DROPS_TOTAL).increment(3);
        });
        assert!(handle.render().contains("room_broadcast_drops_total 3"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            ROOM_BROADCAST_DROPS_TOTAL,
            ROOM_FANOUT_PUBLISH_ERRORS_TOTAL,
            HISTORY_ERRORS_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
