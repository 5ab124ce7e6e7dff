//! Output synchronization engine for AI agent session panels.
//!
//! A control panel that runs long-lived CLI agent sessions needs to project
//! each session's growing output stream into a terminal widget while the
//! user creates, switches, resumes, and archives sessions concurrently. This
//! crate is that projection engine: a single-actor state machine that
//! fetches output from a session data service, diffs it against a cursor,
//! and issues minimal append/clear operations against a sink, with
//! single-flight fetching, abort-on-switch cancellation, and a bounded retry
//! policy for sessions that are still starting up.
//!
//! The host supplies the two collaborators: a [`SessionService`] backed by
//! its IPC layer and a [`Sink`] backed by its terminal widget. Everything
//! else (dialogs, rendering, worktrees, notifications) lives outside this
//! crate.

pub mod config;
pub mod engine;
pub mod models;
pub mod replay;
pub mod service;
pub mod sink;

pub use config::SyncConfig;
pub use engine::{EngineStatus, LoadState, OutputSyncEngine};
pub use models::{SessionSnapshot, SessionStatus};
pub use service::{ServiceError, SessionEvent, SessionService};
pub use sink::{Sink, VtSink};
