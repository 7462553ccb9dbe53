// events.rs: Debugger notifications and their dispatch.
//
// The manager publishes an event whenever debugging is switched on or off for
// a policy, and when a session is terminated. Sinks are fire-and-forget: a
// failing sink is logged and never affects the debugger or the request.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DebugError;
use crate::session::{PolicyId, TaskId};

/// Events emitted by the debug manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DebugEvent {
    /// A session was armed for a policy.
    DebuggingEnabled {
        task_id: TaskId,
        policy_id: PolicyId,
        timestamp: DateTime<Utc>,
    },

    /// An active session returned to Stopped.
    DebuggingDisabled {
        task_id: TaskId,
        policy_id: PolicyId,
        timestamp: DateTime<Utc>,
    },

    /// A session was removed from the registry.
    SessionTerminated {
        task_id: TaskId,
        policy_id: PolicyId,
        timestamp: DateTime<Utc>,
    },
}

impl DebugEvent {
    pub fn event_type(&self) -> &str {
        match self {
            DebugEvent::DebuggingEnabled { .. } => "debugging_enabled",
            DebugEvent::DebuggingDisabled { .. } => "debugging_disabled",
            DebugEvent::SessionTerminated { .. } => "session_terminated",
        }
    }

    pub fn debugging_enabled(task_id: TaskId, policy_id: &PolicyId) -> Self {
        DebugEvent::DebuggingEnabled {
            task_id,
            policy_id: policy_id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn debugging_disabled(task_id: TaskId, policy_id: &PolicyId) -> Self {
        DebugEvent::DebuggingDisabled {
            task_id,
            policy_id: policy_id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn session_terminated(task_id: TaskId, policy_id: &PolicyId) -> Self {
        DebugEvent::SessionTerminated {
            task_id,
            policy_id: policy_id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives debugger events.
///
/// Called from controller and worker threads alike, hence `Send + Sync`.
pub trait NotificationSink: Send + Sync {
    /// Handle an event. Errors are logged but don't stop the debugger.
    fn send(&self, event: &DebugEvent) -> Result<(), DebugError>;
}

/// Appends events as JSONL to a file opened once, at construction.
pub struct LogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogSink {
    /// Open (or create) the log, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DebugError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| DebugError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationSink for LogSink {
    fn send(&self, event: &DebugEvent) -> Result<(), DebugError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        // One write per line keeps concurrent appends from interleaving.
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line).map_err(|source| DebugError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

/// Emits each event as an `info` log line.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, event: &DebugEvent) -> Result<(), DebugError> {
        let json = serde_json::to_string(event)?;
        tracing::info!(event_type = event.event_type(), "{}", json);
        Ok(())
    }
}

/// Fans each debugger event out to the configured sinks.
///
/// Delivery is best effort: a failing sink is logged with the event it
/// dropped and the remaining sinks still receive it.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn dispatch(&self, event: &DebugEvent) {
        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.send(event) {
                tracing::warn!(
                    sink = index,
                    event_type = event.event_type(),
                    error = %e,
                    "debugger notification dropped"
                );
            }
        }
    }
}
