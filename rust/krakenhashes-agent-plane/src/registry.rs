//! In-memory registry of live agent connections.
//!
//! One entry per currently-connected agent, holding the outbox the
//! connection's writer task drains. The scheduler (outside this crate)
//! looks agents up here to deliver `task_assignment`/`job_stop`/etc; it
//! never touches the underlying WebSocket directly.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AgentPlaneError, AgentPlaneResult};
use crate::messages::CommandPlaneMessage;

/// One outbound frame plus the envelope timestamp the writer task stamps it
/// with; kept separate from [`crate::messages::Envelope`] so callers can
/// hand in a bare message and let the writer assign `Utc::now()`.
pub type OutboundFrame = CommandPlaneMessage;

#[derive(Clone)]
struct Connection {
    outbox: mpsc::UnboundedSender<OutboundFrame>,
    connected_at: DateTime<Utc>,
    last_pong_at: Arc<parking_lot::Mutex<Instant>>,
}

/// Shared across every per-agent connection task and the scheduler. Cheap
/// to clone (wraps an `Arc<DashMap<..>>`); one instance serves the whole
/// command plane.
#[derive(Clone, Default)]
pub struct AgentConnectionRegistry {
    connections: Arc<DashMap<Uuid, Connection>>,
}

impl AgentConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Registers a freshly-authenticated connection and returns the
    /// receiving half of its outbox for the writer task to drain. Any prior
    /// connection for the same agent is dropped (its outbox sender is
    /// discarded, so its writer task's next send fails and it exits).
    pub fn register(&self, agent_id: Uuid) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            agent_id,
            Connection {
                outbox: tx,
                connected_at: Utc::now(),
                last_pong_at: Arc::new(parking_lot::Mutex::new(Instant::now())),
            },
        );
        rx
    }

    pub fn deregister(&self, agent_id: Uuid) {
        self.connections.remove(&agent_id);
    }

    pub fn is_connected(&self, agent_id: Uuid) -> bool {
        self.connections.contains_key(&agent_id)
    }

    pub fn connected_at(&self, agent_id: Uuid) -> Option<DateTime<Utc>> {
        self.connections.get(&agent_id).map(|c| c.connected_at)
    }

    pub fn record_pong(&self, agent_id: Uuid) {
        if let Some(conn) = self.connections.get(&agent_id) {
            *conn.last_pong_at.lock() = Instant::now();
        }
    }

    /// Seconds since the agent's last pong, or `None` if it isn't connected.
    pub fn seconds_since_pong(&self, agent_id: Uuid) -> Option<u64> {
        self.connections
            .get(&agent_id)
            .map(|c| c.last_pong_at.lock().elapsed().as_secs())
    }

    /// At-most-once delivery per connection attempt (§4.9): this enqueues
    /// onto the agent's outbox if it is currently connected, or reports
    /// `Transient` so the caller can fall back to reconnect semantics.
    /// Idempotent retries belong to the caller, keyed by task id.
    pub fn send_to(&self, agent_id: Uuid, message: OutboundFrame) -> AgentPlaneResult<()> {
        let conn = self
            .connections
            .get(&agent_id)
            .ok_or(AgentPlaneError::UnknownAgent(agent_id))?;
        conn.outbox
            .send(message)
            .map_err(|_| AgentPlaneError::NetworkError("agent outbox closed".into()))
    }

    pub fn connected_agent_ids(&self) -> Vec<Uuid> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
