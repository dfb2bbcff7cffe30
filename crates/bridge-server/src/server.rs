//! `BridgeServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bridge_core::SessionId;
use bridge_core::constants::{CLOSE_CONFIG_ERROR, CLOSE_CONFIG_ERROR_REASON};
use bridge_memory::MemoryStore;
use bridge_settings::BridgeSettings;
use bridge_upstream::{UpstreamDialer, WebSocketDialer};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::health::{self, HealthResponse};
use crate::registry::SessionRegistry;
use crate::relay::{RelayConfig, RelayDeps, run_session};
use crate::shutdown::ShutdownCoordinator;
use crate::transport;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<BridgeSettings>,
    /// `None` when no upstream credential is configured.
    relay: Option<RelayDeps>,
    memory_enabled: bool,
    sessions: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    http: reqwest::Client,
}

/// The bridge server.
pub struct BridgeServer {
    settings: Arc<BridgeSettings>,
    dialer: Option<Arc<dyn UpstreamDialer>>,
    store: Option<Arc<dyn MemoryStore>>,
    sessions: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    http: reqwest::Client,
}

impl BridgeServer {
    /// Create a server. `store = None` runs every session without memory.
    ///
    /// Without an upstream credential the server still starts; clients are
    /// accepted and immediately closed with a configuration error.
    pub fn new(settings: BridgeSettings, store: Option<Arc<dyn MemoryStore>>) -> Self {
        let dialer = match WebSocketDialer::from_settings(&settings.upstream) {
            Ok(dialer) => Some(Arc::new(dialer) as Arc<dyn UpstreamDialer>),
            Err(error) => {
                warn!(%error, "upstream credential not configured, sessions will be refused");
                None
            }
        };
        Self {
            settings: Arc::new(settings),
            dialer,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            http: reqwest::Client::new(),
        }
    }

    /// Replace the upstream dialer.
    #[must_use]
    pub fn with_dialer(mut self, dialer: Arc<dyn UpstreamDialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let relay = self.dialer.as_ref().map(|dialer| RelayDeps {
            dialer: Arc::clone(dialer),
            store: self.store.clone(),
            config: Arc::new(RelayConfig::from_settings(&self.settings)),
        });
        let state = AppState {
            settings: Arc::clone(&self.settings),
            relay,
            memory_enabled: self.store.is_some(),
            sessions: Arc::clone(&self.sessions),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            http: self.http.clone(),
        };

        Router::new()
            .route(&self.settings.server.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let server = &self.settings.server;
        let listener = TcpListener::bind((server.host.as_str(), server.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, ws_path = %server.ws_path, "bridge server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(%error, "server stopped with an error");
            }
        });
        Ok((addr, handle))
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Live session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Settings the server was built with.
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }
}

/// GET `<ws_path>`: upgrade and run one session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let shutdown = Arc::clone(&state.shutdown);
    ws.max_message_size(state.settings.server.max_message_size)
        .on_upgrade(move |socket| shutdown.track(handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let Some(deps) = state.relay.clone() else {
        warn!("client refused: upstream credential not configured");
        transport::refuse(socket, CLOSE_CONFIG_ERROR, CLOSE_CONFIG_ERROR_REASON).await;
        return;
    };

    let guard = state.sessions.register(SessionId::new());
    let (channel, client) = transport::attach(socket);
    let _ = run_session(guard.id().clone(), channel, deps, state.shutdown.token()).await;
    client.finish().await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let upstream = health::probe_upstream(&state.http, &state.settings.upstream.probe_url).await;
    Json(health::health_check(
        state.start_time,
        state.sessions.len(),
        state.settings.upstream.api_key().is_some(),
        state.memory_enabled,
        upstream,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use bridge_memory::InMemoryStore;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(probe_url: String, api_key: Option<&str>) -> BridgeSettings {
        let mut settings = BridgeSettings::default();
        settings.upstream.probe_url = probe_url;
        settings.upstream.api_key = api_key.map(str::to_owned);
        settings
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    async fn probe_target() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn health_reports_ok_with_credential() {
        let upstream = probe_target().await;
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let server = BridgeServer::new(settings(upstream.uri(), Some("k")), Some(store));

        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["apiKeyConfigured"], true);
        assert_eq!(body["memoryEnabled"], true);
        assert_eq!(body["activeSessions"], 0);
        assert_eq!(body["upstream"]["reachable"], true);
        assert_eq!(body["upstream"]["status"], 404);
    }

    #[tokio::test]
    async fn health_is_degraded_without_credential() {
        let upstream = probe_target().await;
        let server = BridgeServer::new(settings(upstream.uri(), None), None);

        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["apiKeyConfigured"], false);
        assert_eq!(body["memoryEnabled"], false);
    }

    #[tokio::test]
    async fn metrics_not_found_without_recorder() {
        let server = BridgeServer::new(BridgeSettings::default(), None);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_rendered_with_recorder() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = BridgeServer::new(BridgeSettings::default(), None).with_metrics(handle);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_path_rejects_plain_get() {
        let server = BridgeServer::new(BridgeSettings::default(), None);
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = BridgeServer::new(BridgeSettings::default(), None);
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn shutdown_propagates_to_coordinator() {
        let server = BridgeServer::new(BridgeSettings::default(), None);
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
        assert!(server.sessions().is_empty());
    }
}
