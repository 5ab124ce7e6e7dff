use crate::config::SyncConfig;
use crate::engine::cursor::Cursor;
use crate::engine::projector::{project, Projection};
use crate::engine::{EngineStatus, LoadState};
use crate::models::SessionStatus;
use crate::service::{ServiceError, SessionEvent, SessionService};
use crate::sink::Sink;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One-time notice written to the sink when the bound session turns out to be
/// archived or deleted.
pub const ARCHIVED_NOTICE: &str = "Session archived. Output is no longer available.\n";

#[derive(Debug)]
pub(super) enum Command {
    Bind(Uuid, SessionStatus),
    Unbind,
    ForceReload,
    ForceReset,
    ContinuationPending(bool),
    Shutdown,
}

/// Result of one fetch task, tagged with the generation it was spawned under
/// so results that outlive their binding are discarded.
struct FetchOutcome {
    generation: u64,
    session_id: Uuid,
    result: Result<Vec<String>, ServiceError>,
}

struct InFlight {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Everything scoped to one bound session. Replaced wholesale on rebind.
struct Binding {
    session_id: Uuid,
    status: SessionStatus,
    cursor: Cursor,
    state: LoadState,
    retry_count: u32,
    continuation_pending: bool,
    pending_reload: bool,
    last_error: Option<String>,
}

impl Binding {
    fn new(session_id: Uuid, status: SessionStatus) -> Self {
        Self {
            session_id,
            status,
            cursor: Cursor::new(session_id),
            state: LoadState::Idle,
            retry_count: 0,
            continuation_pending: false,
            pending_reload: false,
            last_error: None,
        }
    }
}

/// The load state machine. Runs as a single actor task so every transition is
/// serialized; the fetch call is the only suspension point and it happens on
/// a spawned task, never inside the loop.
pub(super) struct Coordinator {
    service: Arc<dyn SessionService>,
    sink: Box<dyn Sink>,
    config: SyncConfig,
    binding: Option<Binding>,
    in_flight: Option<InFlight>,
    generation: u64,
    archived: HashSet<Uuid>,
    outcome_tx: mpsc::UnboundedSender<FetchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    status_tx: watch::Sender<EngineStatus>,
}

impl Coordinator {
    pub(super) fn new(
        service: Arc<dyn SessionService>,
        sink: Box<dyn Sink>,
        config: SyncConfig,
        status_tx: watch::Sender<EngineStatus>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            service,
            sink,
            config,
            binding: None,
            in_flight: None,
            generation: 0,
            archived: HashSet::new(),
            outcome_tx,
            outcome_rx,
            status_tx,
        }
    }

    pub(super) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let mut events = self.service.subscribe();

        loop {
            tokio::select! {
                // Host commands take effect before any event that arrived
                // after them; a queued suppressor must not lose the race to
                // an output announcement.
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed announcements may include an OutputAvailable
                        // for the bound session; refetch conservatively.
                        warn!(missed, "session event stream lagged");
                        self.on_output_available();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Service shut down; keep serving commands so the
                        // host can still unbind cleanly.
                    }
                },
            }
        }

        self.cancel_in_flight();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Bind(session_id, status) => self.bind(session_id, status),
            Command::Unbind => self.unbind(),
            Command::ForceReload => self.force_reload(),
            Command::ForceReset => self.force_reset(),
            Command::ContinuationPending(flag) => {
                if let Some(binding) = &mut self.binding {
                    binding.continuation_pending = flag;
                    debug!(
                        session = %binding.session_id,
                        pending = flag,
                        "continuation flag updated"
                    );
                }
            }
            Command::Shutdown => unreachable!("handled in run loop"),
        }
    }

    /// Rebind to a session. Strictly ordered: cancel old, clear sink, bind
    /// new, fetch new.
    fn bind(&mut self, session_id: Uuid, status: SessionStatus) {
        if let Some(binding) = &self.binding {
            if binding.session_id == session_id {
                debug!(session = %session_id, "bind to already-bound session ignored");
                return;
            }
        }

        self.cancel_in_flight();
        self.sink.clear();
        self.binding = Some(Binding::new(session_id, status));
        info!(session = %session_id, status = status.display_name(), "bound session");

        if self.archived.contains(&session_id) {
            self.sink.append(ARCHIVED_NOTICE);
            self.publish();
            return;
        }

        self.publish();
        let delay = self.current_delay();
        self.schedule_fetch(delay);
    }

    fn unbind(&mut self) {
        self.cancel_in_flight();
        if let Some(binding) = self.binding.take() {
            info!(session = %binding.session_id, "unbound session");
        }
        self.publish();
    }

    /// Manual reload affordance. Bypasses the continuation suppressor and,
    /// unlike automatic paths, is allowed to probe a session previously
    /// marked archived.
    fn force_reload(&mut self) {
        let Some(session_id) = self.binding.as_ref().map(|b| b.session_id) else {
            return;
        };

        if self.archived.remove(&session_id) {
            info!(session = %session_id, "manual reload clearing archived mark");
        }

        if self.in_flight.is_some() {
            if let Some(binding) = &mut self.binding {
                binding.pending_reload = true;
            }
            return;
        }

        if let Some(binding) = &mut self.binding {
            binding.retry_count = 0;
            binding.last_error = None;
        }
        let delay = self.current_delay();
        self.schedule_fetch(delay);
    }

    /// Escape hatch for stuck states: cancel everything and return to idle
    /// with no binding.
    fn force_reset(&mut self) {
        self.cancel_in_flight();
        if let Some(binding) = self.binding.take() {
            warn!(session = %binding.session_id, "force reset dropped binding");
        }
        self.publish();
    }

    fn handle_event(&mut self, event: SessionEvent) {
        // Subscription is scoped to the bound session; everything else is
        // ignored.
        let Some(bound_id) = self.binding.as_ref().map(|b| b.session_id) else {
            return;
        };
        if event.session_id() != bound_id {
            return;
        }

        match event {
            SessionEvent::OutputAvailable(_) => self.on_output_available(),
            SessionEvent::StatusChanged(_, status) => {
                debug!(
                    session = %bound_id,
                    status = status.display_name(),
                    "session status changed"
                );
                if let Some(binding) = &mut self.binding {
                    binding.status = status;
                }
            }
            SessionEvent::SessionDeleted(_) => self.mark_archived("session deleted"),
        }
    }

    fn on_output_available(&mut self) {
        let Some((session_id, continuation_pending)) = self
            .binding
            .as_ref()
            .map(|b| (b.session_id, b.continuation_pending))
        else {
            return;
        };

        if self.archived.contains(&session_id) {
            return;
        }

        if continuation_pending {
            debug!(session = %session_id, "reload suppressed while continuation pending");
            return;
        }

        if self.in_flight.is_some() {
            // Single-flight: remember the announcement and fetch again once
            // the current request settles.
            if let Some(binding) = &mut self.binding {
                binding.pending_reload = true;
            }
            return;
        }

        let delay = self.current_delay();
        self.schedule_fetch(delay);
    }

    /// Start the one allowed fetch: delay, call the service, post the tagged
    /// outcome back to the actor. Aborting the task covers both the delay
    /// and the service call.
    fn schedule_fetch(&mut self, delay: Duration) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(binding) = &mut self.binding else {
            return;
        };
        if self.archived.contains(&binding.session_id) {
            return;
        }

        binding.state = LoadState::Loading;
        let session_id = binding.session_id;

        self.generation += 1;
        let generation = self.generation;
        let service = Arc::clone(&self.service);
        let outcome_tx = self.outcome_tx.clone();

        debug!(
            session = %session_id,
            generation,
            delay_ms = delay.as_millis() as u64,
            "scheduling fetch"
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = service.get_output(session_id).await;
            let _ = outcome_tx.send(FetchOutcome {
                generation,
                session_id,
                result,
            });
        });

        self.in_flight = Some(InFlight { generation, handle });
        self.publish();
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
            debug!(generation = in_flight.generation, "cancelled in-flight fetch");
        }
    }

    fn handle_outcome(&mut self, outcome: FetchOutcome) {
        let current = matches!(
            &self.in_flight,
            Some(in_flight) if in_flight.generation == outcome.generation
        );
        if !current {
            debug!(
                session = %outcome.session_id,
                generation = outcome.generation,
                "discarding stale fetch result"
            );
            return;
        }
        self.in_flight = None;

        let bound_id = self.binding.as_ref().map(|b| b.session_id);
        if bound_id != Some(outcome.session_id) {
            // Rebind aborts the old fetch before this can happen; guard
            // anyway so a stale result can never touch the sink.
            debug!(session = %outcome.session_id, "fetch result for unbound session discarded");
            return;
        }

        match outcome.result {
            Ok(chunks) => self.apply_output(chunks),
            Err(ServiceError::NotFound) => self.mark_archived("session reported missing"),
            Err(ServiceError::Transient(message)) => self.handle_transient_failure(message),
        }
    }

    fn apply_output(&mut self, chunks: Vec<String>) {
        let full = chunks.concat();

        let Some(binding) = &mut self.binding else {
            return;
        };
        binding.retry_count = 0;
        binding.last_error = None;
        binding.state = LoadState::Loaded;

        let result = project(&full, &mut binding.cursor, self.sink.as_mut());
        if result == Projection::Truncated && !full.is_empty() {
            // The reset left the sink empty; replay the current snapshot now
            // instead of waiting for the next announcement.
            project(&full, &mut binding.cursor, self.sink.as_mut());
        }

        debug!(
            session = %binding.session_id,
            processed = binding.cursor.processed,
            ?result,
            "projected output"
        );
        self.publish();

        // An announcement that arrived mid-flight still owes us a fetch.
        let reload_pending = self
            .binding
            .as_mut()
            .map(|b| std::mem::take(&mut b.pending_reload))
            .unwrap_or(false);
        if reload_pending {
            let delay = self.current_delay();
            self.schedule_fetch(delay);
        }
    }

    fn handle_transient_failure(&mut self, message: String) {
        let retry_delay = {
            let Some(binding) = &mut self.binding else {
                return;
            };
            binding.pending_reload = false;
            if binding.status.is_initializing() && binding.retry_count < self.config.max_retries {
                binding.retry_count += 1;
                Some((binding.retry_count, self.config.retry_delay(binding.retry_count)))
            } else {
                binding.state = LoadState::Error;
                binding.last_error = Some(message.clone());
                None
            }
        };

        match retry_delay {
            Some((attempt, delay)) => {
                warn!(
                    attempt,
                    max = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "fetch failed while initializing, retrying"
                );
                self.schedule_fetch(delay);
            }
            None => {
                warn!(error = %message, "fetch failed, surfacing to host");
                self.publish();
            }
        }
    }

    /// NotFound and SessionDeleted both land here. Idempotent: the notice is
    /// written once per session for the lifetime of the engine.
    fn mark_archived(&mut self, reason: &str) {
        self.cancel_in_flight();
        let Some(binding) = &mut self.binding else {
            return;
        };
        binding.state = LoadState::Idle;
        binding.pending_reload = false;

        if self.archived.insert(binding.session_id) {
            info!(session = %binding.session_id, reason, "session archived, halting output sync");
            self.sink.clear();
            self.sink.append(ARCHIVED_NOTICE);
        }
        self.publish();
    }

    fn current_delay(&self) -> Duration {
        match &self.binding {
            Some(binding) if binding.status.is_initializing() => {
                self.config.initializing_delay()
            }
            _ => self.config.reload_delay(),
        }
    }

    fn publish(&self) {
        let status = match &self.binding {
            Some(binding) => EngineStatus {
                session_id: Some(binding.session_id),
                state: binding.state,
                error: binding.last_error.clone(),
                archived: self.archived.contains(&binding.session_id),
            },
            None => EngineStatus::idle(),
        };
        self.status_tx.send_replace(status);
    }
}
