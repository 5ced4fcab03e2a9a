//! The WebSocket command plane server: one axum route, one reader/writer
//! task pair per connected agent, and a ping/pong keepalive loop per §4.9.
//!
//! Mirrors the teacher's `SidecarServer` shape (config + client + metrics +
//! health held on one struct, `new`/`start`) adapted from a gRPC/tonic
//! listener to an axum WebSocket upgrade route.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AgentPlaneError;
use crate::health::HealthChecker;
use crate::messages::{CommandPlaneMessage, Envelope, PingPongPayload};
use crate::metrics::MetricsCollector;
use crate::registry::AgentConnectionRegistry;

/// Looks up the agent owning a presented API key. Implemented by the
/// scheduler crate against its agent store; kept as a trait here so this
/// crate has no persistence dependency of its own.
#[async_trait]
pub trait AgentAuthenticator: Send + Sync + 'static {
    async fn authenticate(&self, api_key: &str) -> Option<Uuid>;
}

/// One event handed up from a connection's reader task to the scheduler:
/// either a parsed inbound message, or the fact that the connection closed
/// (which the scheduler turns into a `reconnect_pending` sweep per §4.11).
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message { agent_id: Uuid, message: CommandPlaneMessage },
    Disconnected { agent_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct CommandPlaneServerConfig {
    pub bind_address: String,
    pub ping_period: Duration,
    pub pong_wait: Duration,
}

impl Default for CommandPlaneServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4424".to_string(),
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct ConnectQuery {
    api_key: String,
}

#[derive(Clone)]
struct AppState {
    registry: AgentConnectionRegistry,
    authenticator: Arc<dyn AgentAuthenticator>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    metrics: Arc<MetricsCollector>,
    health: Arc<HealthChecker>,
    ping_period: Duration,
    pong_wait: Duration,
}

/// Owns the registry, metrics, and health state for the command plane and
/// exposes the axum router that serves it. The scheduler holds the
/// `registry` handle (cloned out before `start`) to push outbound
/// assignments; inbound traffic arrives on the channel returned by `new`.
pub struct CommandPlaneServer {
    config: CommandPlaneServerConfig,
    state: AppState,
}

impl CommandPlaneServer {
    /// Returns the server plus the receiving half of the inbound event
    /// channel the scheduler's progress reconciler and recovery coordinator
    /// should drain.
    pub fn new(
        config: CommandPlaneServerConfig,
        authenticator: Arc<dyn AgentAuthenticator>,
    ) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let state = AppState {
            registry: AgentConnectionRegistry::new(),
            authenticator,
            inbound_tx,
            metrics: Arc::new(MetricsCollector::new(1000)),
            health: Arc::new(HealthChecker::new()),
            ping_period: config.ping_period,
            pong_wait: config.pong_wait,
        };
        (Self { config, state }, inbound_rx)
    }

    pub fn registry(&self) -> AgentConnectionRegistry {
        self.state.registry.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.state.metrics)
    }

    pub fn health(&self) -> Arc<HealthChecker> {
        Arc::clone(&self.state.health)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(handle_upgrade))
            .with_state(self.state.clone())
    }

    pub async fn start(&self) -> Result<(), AgentPlaneError> {
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| AgentPlaneError::NetworkError(e.to_string()))?;
        info!(address = %self.config.bind_address, "command plane listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| AgentPlaneError::InternalError(e.to_string()))
    }
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.authenticator.authenticate(&query.api_key).await {
        Some(agent_id) => ws.on_upgrade(move |socket| handle_socket(socket, agent_id, state)),
        None => {
            warn!("command plane connection rejected: unknown api key");
            axum::http::StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, agent_id: Uuid, state: AppState) {
    info!(%agent_id, "agent connected");
    state.metrics.record_connect();
    state.registry.record_pong(agent_id);
    let mut outbox_rx = state.registry.register(agent_id);

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox_rx.recv().await {
            let envelope = Envelope::new(message);
            let payload = match serde_json::to_string(&envelope) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%agent_id, error = %e, "failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let registry = state.registry.clone();
    let metrics = Arc::clone(&state.metrics);
    let inbound_tx = state.inbound_tx.clone();
    let pong_wait = state.pong_wait;

    let reader = tokio::spawn(async move {
        loop {
            let next = tokio::time::timeout(pong_wait, stream.next()).await;
            let frame = match next {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
            };
            match frame {
                Message::Text(text) => {
                    metrics.record_message(true);
                    match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => match envelope.message {
                            CommandPlaneMessage::Pong(_) => registry.record_pong(agent_id),
                            CommandPlaneMessage::Ping(_) => {
                                let _ = registry.send_to(
                                    agent_id,
                                    CommandPlaneMessage::Pong(PingPongPayload {}),
                                );
                            }
                            other => {
                                let _ = inbound_tx
                                    .send(InboundEvent::Message { agent_id, message: other })
                                    .await;
                            }
                        },
                        Err(e) => {
                            metrics.record_message(false);
                            warn!(%agent_id, error = %e, "malformed command-plane frame dropped");
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Ping loop: send a keepalive every ping_period; the reader's own
    // timeout against pong_wait is what actually declares the peer dead, so
    // this loop just needs to keep pings flowing (§4.9).
    let ping_registry = state.registry.clone();
    let ping_period = state.ping_period;
    let pinger = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_period);
        loop {
            interval.tick().await;
            if ping_registry
                .send_to(agent_id, CommandPlaneMessage::Ping(PingPongPayload {}))
                .is_err()
            {
                break;
            }
        }
    });

    let _ = reader.await;
    pinger.abort();
    writer.abort();

    state.registry.deregister(agent_id);
    state.metrics.record_disconnect();
    let _ = state
        .inbound_tx
        .send(InboundEvent::Disconnected { agent_id })
        .await;
    info!(%agent_id, "agent disconnected");
}
