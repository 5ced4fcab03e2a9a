//! Agent command plane: the WebSocket transport connecting the scheduler
//! core to connected cracking agents (§4.9 of the scheduling spec).
//!
//! This crate owns the wire protocol ([`messages`]), the live-connection
//! registry ([`registry`]), and the axum server that terminates the
//! WebSocket upgrade and runs each connection's reader/writer/ping tasks
//! ([`server`]). It has no knowledge of jobs, tasks, or dispatch — the
//! scheduler crate drives this one through [`server::AgentAuthenticator`]
//! and [`server::InboundEvent`], keeping persistence and scheduling
//! decisions out of the transport layer.

pub mod error;
pub mod health;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod server;

pub use error::{AgentPlaneError, AgentPlaneResult};
pub use messages::{CommandPlaneMessage, Envelope};
pub use registry::AgentConnectionRegistry;
pub use server::{AgentAuthenticator, CommandPlaneServer, CommandPlaneServerConfig, InboundEvent};
