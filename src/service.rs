use crate::models::SessionStatus;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Failure modes of a session output fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The session has been archived or deleted. Terminal: the engine stops
    /// fetching this session.
    #[error("session not found")]
    NotFound,

    /// Network/IPC failure. Retried while the session is still initializing,
    /// surfaced to the host otherwise.
    #[error("session service error: {0}")]
    Transient(String),
}

/// Push events emitted by the session data service.
///
/// The engine subscribes once and filters to its bound session; events for
/// other sessions are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    OutputAvailable(Uuid),
    StatusChanged(Uuid, SessionStatus),
    SessionDeleted(Uuid),
}

impl SessionEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::OutputAvailable(id) => *id,
            SessionEvent::StatusChanged(id, _) => *id,
            SessionEvent::SessionDeleted(id) => *id,
        }
    }
}

/// The session data service as the engine sees it: one request/response call
/// plus an event stream. The real host backs this with its IPC layer; tests
/// and the replay driver back it with in-process state.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Current output chunks for the session, in append order.
    async fn get_output(&self, session_id: Uuid) -> Result<Vec<String>, ServiceError>;

    /// Subscribe to lifecycle events for all sessions.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}
