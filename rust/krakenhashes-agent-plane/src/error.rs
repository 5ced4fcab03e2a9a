//! Error types for the agent WebSocket command plane.

use thiserror::Error;

pub type AgentPlaneResult<T> = Result<T, AgentPlaneError>;

#[derive(Debug, Error)]
pub enum AgentPlaneError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("request timeout: {0}")]
    TimeoutError(String),

    #[error("circuit breaker is open: {0}")]
    CircuitBreakerOpen(String),

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(uuid::Uuid),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl Clone for AgentPlaneError {
    fn clone(&self) -> Self {
        match self {
            Self::NetworkError(s) => Self::NetworkError(s.clone()),
            Self::ValidationError(s) => Self::ValidationError(s.clone()),
            Self::TimeoutError(s) => Self::TimeoutError(s.clone()),
            Self::CircuitBreakerOpen(s) => Self::CircuitBreakerOpen(s.clone()),
            Self::AuthError(s) => Self::AuthError(s.clone()),
            Self::UnknownAgent(id) => Self::UnknownAgent(*id),
            Self::MalformedMessage(s) => Self::MalformedMessage(s.clone()),
            Self::InternalError(s) => Self::InternalError(s.clone()),
        }
    }
}

/// Whether a failed send/dispatch is worth retrying against the same agent.
pub fn is_retryable_error(err: &AgentPlaneError) -> bool {
    matches!(
        err,
        AgentPlaneError::NetworkError(_)
            | AgentPlaneError::TimeoutError(_)
            | AgentPlaneError::CircuitBreakerOpen(_)
    )
}
