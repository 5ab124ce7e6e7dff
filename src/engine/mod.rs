mod coordinator;
mod cursor;
mod projector;

pub use coordinator::ARCHIVED_NOTICE;
pub use cursor::Cursor;
pub use projector::{project, Projection};

use crate::config::SyncConfig;
use crate::models::SessionStatus;
use crate::service::SessionService;
use crate::sink::Sink;
use coordinator::{Command, Coordinator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Where the engine is in loading output for the bound session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Host-visible snapshot of the engine, published through a watch channel on
/// every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub session_id: Option<Uuid>,
    pub state: LoadState,
    /// Human-readable error for surfacing once retries are exhausted.
    /// Cleared by the next successful load.
    pub error: Option<String>,
    /// The bound session was found to be archived/deleted; no automatic
    /// fetches will happen for it again.
    pub archived: bool,
}

impl EngineStatus {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            state: LoadState::Idle,
            error: None,
            archived: false,
        }
    }
}

/// Handle to the output sync actor.
///
/// The engine owns its sink and cursor exclusively; the host drives it
/// through these methods and observes it through [`watch_status`]. All
/// methods are fire-and-forget sends into the actor's command queue, so they
/// are cheap and never block.
///
/// [`watch_status`]: OutputSyncEngine::watch_status
pub struct OutputSyncEngine {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<EngineStatus>,
    task: JoinHandle<()>,
}

impl OutputSyncEngine {
    pub fn spawn(
        service: Arc<dyn SessionService>,
        sink: Box<dyn Sink>,
        config: SyncConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(EngineStatus::idle());
        let coordinator = Coordinator::new(service, sink, config, status_tx);
        let task = tokio::spawn(coordinator.run(cmd_rx));
        Self {
            cmd_tx,
            status_rx,
            task,
        }
    }

    /// Bind to a session, becoming its output writer. Cancels any in-flight
    /// fetch for the previous session and clears the sink before anything
    /// for the new session is written. Binding the already-bound session is
    /// a no-op.
    pub fn bind(&self, session_id: Uuid, status: SessionStatus) {
        let _ = self.cmd_tx.send(Command::Bind(session_id, status));
    }

    /// Drop the current binding and cancel any in-flight fetch.
    pub fn unbind(&self) {
        let _ = self.cmd_tx.send(Command::Unbind);
    }

    /// Manual reload. Works even while a continuation is pending or after
    /// the session was marked archived.
    pub fn force_reload(&self) {
        let _ = self.cmd_tx.send(Command::ForceReload);
    }

    /// Escape hatch: cancel everything and return to idle with no binding.
    pub fn force_reset_state(&self) {
        let _ = self.cmd_tx.send(Command::ForceReset);
    }

    /// While set, automatic reloads from output announcements are
    /// suppressed; `force_reload` is not.
    pub fn set_continuation_pending(&self, pending: bool) {
        let _ = self.cmd_tx.send(Command::ContinuationPending(pending));
    }

    pub fn status(&self) -> EngineStatus {
        self.status_rx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_rx.clone()
    }

    /// Stop the actor and wait for it to wind down.
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = (&mut self.task).await;
    }
}

impl Drop for OutputSyncEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}
