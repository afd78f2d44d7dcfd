//! # Session Management for the Intcode Gateway
//!
//! This module turns a stream of per-connection events into machine runs:
//! - `connect` / `disconnect` bracket a session's lifetime
//! - a `run` message starts a fresh machine and streams its outputs back
//! - a machine that runs out of input is snapshotted into a [`StateStore`]
//!   and the client is prompted for more
//! - an `additional_input` message restores that snapshot and carries on
//!
//! A session is identified by its connection id, which belongs to the
//! transport. Messages for one connection must be delivered one at a time;
//! the manager itself holds no per-connection lock.

use crate::error::{Error, Result};
use crate::machine::{ExecutionResult, Machine};
use crate::request::Request;
use crate::snapshot::Snapshot;
use crate::storage::{MemoryStore, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sent when a message can't be understood
pub const USAGE_MESSAGE: &str = "Send JSON object with program and input to run, e.g. \
{\"action\": \"run\", \"program\": [3,0,4,0,99], \"input\": [42]}";

/// Sent after a program halts
pub const COMPLETED_MESSAGE: &str = "Program completed.";

/// Sent when a program suspends waiting for input
pub const INPUT_REQUIRED_MESSAGE: &str = "Additional input required. \
Send {\"action\": \"additional_input\", \"input\": [...]} to continue.";

/// Sent when input arrives for a program that already halted
pub const ALREADY_COMPLETED_MESSAGE: &str =
    "Program already completed. Send a new program to run.";

/// Prefix of every program error report
pub const PROGRAM_ERROR_PREFIX: &str = "Intcode program error";

// ═══════════════════════════════════════════════════════════════════════════════
// Stored session state
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a session's program stands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Suspended on an INPUT instruction; a snapshot is stored
    AwaitingInput,
    /// Program halted normally
    Completed,
    /// Program raised a program error
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::AwaitingInput => "awaiting_input",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// What the store keeps per connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Unix seconds of the last write
    pub timestamp: u64,
    pub status: SessionStatus,
    /// Present only while awaiting input
    #[serde(default)]
    pub state: Option<Snapshot>,
}

impl SessionRecord {
    pub fn awaiting_input(snapshot: Snapshot) -> Self {
        Self {
            timestamp: current_timestamp(),
            status: SessionStatus::AwaitingInput,
            state: Some(snapshot),
        }
    }

    pub fn completed() -> Self {
        Self {
            timestamp: current_timestamp(),
            status: SessionStatus::Completed,
            state: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            timestamp: current_timestamp(),
            status: SessionStatus::Failed,
            state: None,
        }
    }
}

// =============================================================================
// Outbound messages
// =============================================================================

/// Pushes a message to a remote client
pub trait ConnectionSink: Send + Sync {
    fn post(&self, connection_id: &str, message: &str) -> Result<()>;
}

/// Format a program error for the client
pub fn program_error_message(err: &Error) -> String {
    format!("{}: {}", PROGRAM_ERROR_PREFIX, err.message())
}

// =============================================================================
// SessionManager
// =============================================================================

/// Routes connection events to machines, with pluggable storage and sink
pub struct SessionManager {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn ConnectionSink>,
}

impl SessionManager {
    /// Create a session manager with the given store and sink
    pub fn new(store: Arc<dyn StateStore>, sink: Arc<dyn ConnectionSink>) -> Self {
        Self { store, sink }
    }

    /// Create a session manager with in-memory storage
    pub fn in_memory(sink: Arc<dyn ConnectionSink>) -> Self {
        Self::new(Arc::new(MemoryStore::new()), sink)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn on_connect(&self, connection_id: &str) -> Result<()> {
        log::info!("connect {}", connection_id);
        Ok(())
    }

    /// Drop whatever the connection left behind
    pub fn on_disconnect(&self, connection_id: &str) -> Result<()> {
        log::info!("disconnect {}", connection_id);
        self.store
            .delete(connection_id)
            .map_err(|e| e.with_operation("session::on_disconnect"))
    }

    /// Handle one message body from a connection
    pub fn on_message(&self, connection_id: &str, body: &str) -> Result<()> {
        let request = match Request::parse(body) {
            Ok(request) => request,
            Err(err) => {
                log::debug!("rejecting message from {}: {}", connection_id, err);
                return self.post(connection_id, USAGE_MESSAGE);
            }
        };
        log::debug!("{} from {}", request.action(), connection_id);

        match request {
            Request::Run { program, input } => {
                let machine = Machine::new(program, input);
                self.drive(connection_id, machine)
            }
            Request::AdditionalInput { input } => self.resume(connection_id, input),
        }
    }

    fn resume(&self, connection_id: &str, input: Vec<i64>) -> Result<()> {
        let record = self
            .store
            .get(connection_id)
            .map_err(|e| e.with_operation("session::resume"))?;

        let Some(record) = record else {
            return self.post(connection_id, USAGE_MESSAGE);
        };

        match (record.status, record.state) {
            (SessionStatus::AwaitingInput, Some(snapshot)) => {
                let mut machine = Machine::from_snapshot(snapshot);
                machine.append_input(input);
                self.drive(connection_id, machine)
            }
            (SessionStatus::Completed, _) => self.post(connection_id, ALREADY_COMPLETED_MESSAGE),
            (SessionStatus::Failed, _) => self.post(
                connection_id,
                &format!(
                    "{}: previous program failed. Send a new program to run.",
                    PROGRAM_ERROR_PREFIX
                ),
            ),
            (SessionStatus::AwaitingInput, None) => Err(Error::session_not_found(connection_id)
                .with_operation("session::resume")
                .with_context("reason", "record has no snapshot")),
        }
    }

    /// Pull outputs until the machine halts, suspends or fails
    fn drive(&self, connection_id: &str, mut machine: Machine) -> Result<()> {
        for result in machine.outputs() {
            match result {
                ExecutionResult::Output(value) => {
                    self.post(connection_id, &value.to_string())?;
                }
                ExecutionResult::Halted => {
                    self.store.put(connection_id, &SessionRecord::completed())?;
                    return self.post(connection_id, COMPLETED_MESSAGE);
                }
                ExecutionResult::NeedsInput => break,
                ExecutionResult::Failed(err) => {
                    log::warn!("program error on {}: {}", connection_id, err);
                    self.store.put(connection_id, &SessionRecord::failed())?;
                    return self.post(connection_id, &program_error_message(&err));
                }
            }
        }

        // only reachable through NeedsInput
        let record = SessionRecord::awaiting_input(machine.snapshot());
        self.store
            .put(connection_id, &record)
            .map_err(|e| e.with_operation("session::suspend"))?;
        self.post(connection_id, INPUT_REQUIRED_MESSAGE)
    }

    fn post(&self, connection_id: &str, message: &str) -> Result<()> {
        log::debug!("-> {}: {}", connection_id, message);
        self.sink.post(connection_id, message)
    }
}

fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
