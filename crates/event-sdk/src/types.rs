//! Core types shared by the dispatcher and the connection orchestrator.

use std::fmt;

use lk_domain::config::Domain;

/// Per-client identity.  Set once when the client is built.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub app_id: String,
    pub app_secret: String,
    pub domain: Domain,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Lifecycle state of an [`EventClient`](crate::EventClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected and no reconnect scheduled.
    Idle,
    /// Calling the endpoint negotiation API.
    Negotiating,
    /// Socket open; heartbeat and read loop running.
    Connected,
    /// Waiting for the next reconnect attempt.
    Reconnecting,
    /// `stop()` was called.  Only `start()` leaves this state.
    Stopped,
}

/// Result type for event handlers.  `Ok(None)` sends a bare success
/// response; `Ok(Some(v))` embeds `v` in the response frame.
pub type HandlerResult = Result<Option<serde_json::Value>, HandlerError>;

/// Errors an event handler can return.
///
/// Any of these is answered with a code-500 response frame; the
/// connection itself is unaffected.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HandlerError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}

/// Snapshot of reconnect bookkeeping, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectInfo {
    /// Epoch ms of the last connection attempt (0 = never).
    pub last_connect_time: i64,
    /// Epoch ms of the next scheduled attempt (0 = none scheduled yet).
    pub next_connect_time: i64,
    /// Whether a reconnect sequence is currently running.
    pub in_flight: bool,
}
