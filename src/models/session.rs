use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Running,
    Waiting,
    Stopped,
    CompletedUnviewed,
    Error,
}

impl SessionStatus {
    /// The agent process may not have produced its first output yet.
    pub fn is_initializing(&self) -> bool {
        matches!(self, SessionStatus::Initializing)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "Initializing",
            SessionStatus::Running => "Running",
            SessionStatus::Waiting => "Waiting",
            SessionStatus::Stopped => "Stopped",
            SessionStatus::CompletedUnviewed => "Completed",
            SessionStatus::Error => "Error",
        }
    }
}

/// Read-only view of a session as reported by the session data service.
///
/// Sessions are created and mutated by the external orchestrator; the sync
/// engine only ever reads them and fetches their output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: SessionStatus,
    #[serde(default)]
    pub output_chunks: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn new(id: Uuid, status: SessionStatus) -> Self {
        Self {
            id,
            status,
            output_chunks: Vec::new(),
            archived: false,
            created_at: Utc::now(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_to_unarchived_with_no_output() {
        let session = SessionSnapshot::new(Uuid::new_v4(), SessionStatus::Running);
        assert!(!session.archived);
        assert!(session.output_chunks.is_empty());
    }

    #[test]
    fn status_roundtrips_through_serde() {
        let json = serde_json::to_string(&SessionStatus::CompletedUnviewed).unwrap();
        assert_eq!(json, "\"completed_unviewed\"");
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionStatus::CompletedUnviewed);
    }
}
