//! Scripted session data service for driving the engine without a real host.
//!
//! A replay script is a JSON file describing one session and a sequence of
//! timed mutations to it. The demo binary feeds a script through the engine
//! into a vt100 sink; tests use it as an end-to-end harness.

use crate::models::{SessionSnapshot, SessionStatus};
use crate::service::{ServiceError, SessionEvent, SessionService};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub session: ReplaySession,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {:?}", path))?;
        let script: ReplayScript = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse replay script {:?}", path))?;
        Ok(script)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaySession {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default = "default_status")]
    pub status: SessionStatus,
}

fn default_status() -> SessionStatus {
    SessionStatus::Initializing
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: default_status(),
        }
    }
}

/// One timed mutation. Fields are independent so a step can, say, emit
/// output and change status at once; `after_ms` is relative to the previous
/// step.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayStep {
    #[serde(default)]
    pub after_ms: u64,
    /// Append an output chunk.
    #[serde(default)]
    pub output: Option<String>,
    /// Change the session status.
    #[serde(default)]
    pub status: Option<SessionStatus>,
    /// Shrink accumulated output to the first `n` chunks (upstream
    /// truncation; `0` drops everything).
    #[serde(default)]
    pub truncate: Option<usize>,
    /// Make the next fetch fail with a transient error.
    #[serde(default)]
    pub fail: Option<String>,
    /// Archive the session; all further fetches return NotFound.
    #[serde(default)]
    pub delete: bool,
}

struct ReplayState {
    session: SessionSnapshot,
    fail_next: Option<String>,
}

/// In-process [`SessionService`] that owns one scripted session.
pub struct ReplayService {
    state: Mutex<ReplayState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ReplayService {
    pub fn new(session: &ReplaySession) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(ReplayState {
                session: SessionSnapshot::new(session.id, session.status),
                fail_next: None,
            }),
            events,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.state.lock().unwrap().session.id
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody subscribed is fine; the engine may already be gone.
        let _ = self.events.send(event);
    }

    /// Apply the script steps on schedule, emitting the matching service
    /// events as a live host would.
    pub async fn drive(&self, steps: &[ReplayStep]) {
        for step in steps {
            if step.after_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
            }

            let id = {
                let mut state = self.state.lock().unwrap();
                if let Some(chunk) = &step.output {
                    state.session.output_chunks.push(chunk.clone());
                }
                if let Some(keep) = step.truncate {
                    state.session.output_chunks.truncate(keep);
                }
                if let Some(status) = step.status {
                    state.session.status = status;
                }
                if let Some(message) = &step.fail {
                    state.fail_next = Some(message.clone());
                }
                if step.delete {
                    state.session.archived = true;
                }
                state.session.id
            };

            debug!(session = %id, ?step, "applied replay step");

            if let Some(status) = step.status {
                self.emit(SessionEvent::StatusChanged(id, status));
            }
            if step.delete {
                self.emit(SessionEvent::SessionDeleted(id));
            } else if step.output.is_some() || step.truncate.is_some() {
                self.emit(SessionEvent::OutputAvailable(id));
            }
        }
    }
}

#[async_trait]
impl SessionService for ReplayService {
    async fn get_output(&self, session_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        if session_id != state.session.id || state.session.archived {
            return Err(ServiceError::NotFound);
        }
        if let Some(message) = state.fail_next.take() {
            return Err(ServiceError::Transient(message));
        }
        Ok(state.session.output_chunks.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
