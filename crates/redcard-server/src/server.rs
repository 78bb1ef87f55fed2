//! `RedcardServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use redcard_core::ConnectionId;
use redcard_game::{Controller, Deck, Game, Outbox};
use redcard_settings::GameSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::game_loop::{Inbound, run_game_loop};
use crate::websocket::hub::ConnectionHub;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Open sockets.
    pub hub: Arc<ConnectionHub>,
    /// Session registry, read for health counts.
    pub game: Arc<Mutex<Game>>,
    /// Queue into the game loop.
    pub inbound: mpsc::Sender<Inbound>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle; `None` disables `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The redcard server.
pub struct RedcardServer {
    config: Arc<ServerConfig>,
    hub: Arc<ConnectionHub>,
    game: Arc<Mutex<Game>>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RedcardServer {
    /// Create a new server. Nothing is bound until [`Self::listen`].
    pub fn new(
        config: ServerConfig,
        rules: GameSettings,
        deck: Deck,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let outbox: Arc<dyn Outbox> = hub.clone();
        let game = Arc::new(Mutex::new(Game::new(rules, deck, outbox)));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_size.max(1));
        Self {
            config: Arc::new(config),
            hub,
            game,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            hub: self.hub.clone(),
            game: self.game.clone(),
            inbound: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the game loop, and serve until shutdown.
    ///
    /// Returns the bound address and a handle that completes once the
    /// HTTP server and the game loop have both stopped.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        if self.inbound_rx.lock().is_none() {
            return Err(ServerError::AlreadyListening);
        }
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(ServerError::AlreadyListening)?;

        let mut controller = Controller::new(self.hub.clone());
        Game::attach(&self.game, &mut controller);
        let game_loop = tokio::spawn(run_game_loop(
            rx,
            controller,
            self.game.clone(),
            self.shutdown.token(),
        ));

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server failed");
            }
            let _ = game_loop.await;
            info!("server stopped");
        });

        info!(addr = %local_addr, "redcard server listening");
        Ok((local_addr, handle))
    }

    /// Open sockets.
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Session registry.
    pub fn game(&self) -> &Arc<Mutex<Game>> {
        &self.game
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let open = state.hub.connection_count();
    if open >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(open, limit = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let ctx = SessionContext {
        hub: state.hub.clone(),
        inbound: state.inbound.clone(),
        heartbeat_interval: state.config.heartbeat_interval(),
        heartbeat_timeout: state.config.heartbeat_timeout(),
        send_queue_size: state.config.send_queue_size,
        shutdown: state.shutdown.token(),
    };
    let connection_id = ConnectionId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, connection_id, ctx))
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.game.lock().session_count();
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        sessions,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
