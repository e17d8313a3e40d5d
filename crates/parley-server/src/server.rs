//! `ParleyServer`: Axum HTTP + WebSocket surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_core::{ClientId, RoomCode, display_name};
use parley_settings::ParleySettings;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::health::{self, HealthResponse};
use crate::room::{RoomRegistry, RoomSummary};
use crate::shutdown::Shutdown;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Room registry.
    pub registry: Arc<RoomRegistry>,
    /// Effective settings.
    pub settings: Arc<ParleySettings>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct ParleyServer {
    settings: Arc<ParleySettings>,
    registry: Arc<RoomRegistry>,
    shutdown: Shutdown,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl ParleyServer {
    /// Create a server around an existing registry.
    pub fn new(settings: ParleySettings, registry: RoomRegistry) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            shutdown: Shutdown::default(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/rooms", get(rooms_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown is triggered.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "parley server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Shutdown signal.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Effective settings.
    pub fn settings(&self) -> &ParleySettings {
        &self.settings
    }
}

/// Query string of `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    /// Room code.
    pub room: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

impl JoinParams {
    /// Normalize and validate both parameters.
    pub fn validate(&self) -> Option<(RoomCode, String)> {
        let code = RoomCode::parse(self.room.as_deref()?).ok()?;
        let name = display_name(self.name.as_deref()?).ok()?;
        Some((code, name))
    }
}

/// GET /ws?room=&name=: validate, then upgrade.
async fn ws_handler(
    Query(params): Query<JoinParams>,
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some((code, name)) = params.validate() else {
        return (StatusCode::BAD_REQUEST, "room & name required").into_response();
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let ctx = SessionContext {
        room: state.registry.get_or_create(&code),
        history: state.registry.history().cloned(),
        settings: state.settings.session.clone(),
    };
    let client_id = ClientId::new();
    upgrade
        .max_message_size(state.settings.session.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, ctx, client_id, name))
}

/// GET /rooms
async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.registry.roster())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.room_count(),
        state.registry.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not enabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use parley_backplane::Backplane;
    use parley_settings::RoomSettings;
    use tower::ServiceExt;

    use super::*;

    fn make_server() -> ParleyServer {
        let registry = RoomRegistry::new(&RoomSettings::default(), Backplane::none());
        ParleyServer::new(ParleySettings::default(), registry)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn join_params_validation() {
        let ok = JoinParams {
            room: Some(" abcd ".into()),
            name: Some(" Zed ".into()),
        };
        let (code, name) = ok.validate().unwrap();
        assert_eq!(code.as_str(), "ABCD");
        assert_eq!(name, "Zed");

        for (room, name) in [
            (None, Some("Zed")),
            (Some("abcd"), None),
            (Some("   "), Some("Zed")),
            (Some("abcd"), Some("  ")),
            (Some("a*b"), Some("Zed")),
        ] {
            let params = JoinParams {
                room: room.map(str::to_owned),
                name: name.map(str::to_owned),
            };
            assert!(params.validate().is_none(), "{params:?}");
        }
    }

    #[tokio::test]
    async fn ws_without_params_is_bad_request() {
        let server = make_server();
        let (status, body) = get(server.router(), "/ws").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"room & name required");
    }

    #[tokio::test]
    async fn ws_with_blank_name_is_bad_request() {
        let server = make_server();
        let (status, _) = get(server.router(), "/ws?room=ABCD&name=%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(server.registry().room_count(), 0);
    }

    #[tokio::test]
    async fn ws_with_params_but_no_upgrade_is_rejected() {
        let server = make_server();
        let (status, _) = get(server.router(), "/ws?room=ABCD&name=Zed").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn rooms_lists_registry() {
        let server = make_server();
        let _ = server.registry().get_or_create(&RoomCode::parse("beta").unwrap());
        let _ = server.registry().get_or_create(&RoomCode::parse("alpha").unwrap());

        let (status, body) = get(server.router(), "/rooms").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed[0]["code"], "ALPHA");
        assert_eq!(parsed[0]["id"], "ALPHA|ALPHA");
        assert_eq!(parsed[1]["name"], "BETA");
        assert_eq!(parsed[1]["count"], 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["rooms"], 0);
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn metrics_disabled_by_default() {
        let (status, _) = get(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_rendered_when_configured() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let (status, _) = get(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_stops_on_shutdown() {
        let mut settings = ParleySettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let registry = RoomRegistry::new(&settings.rooms, Backplane::none());
        let server = ParleyServer::new(settings, registry);

        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.shutdown().drain(handle).await);
    }
}
