// error.rs: Error types for the step debugger.

use thiserror::Error;

use crate::session::{PolicyId, TaskId};

/// Errors returned by debugger operations.
///
/// Pipeline hooks never surface these; only controller-facing commands and
/// configuration loading do.
#[derive(Debug, Error)]
pub enum DebugError {
    /// No live session is registered under the task id.
    #[error("debug task not found: {0}")]
    TaskNotFound(TaskId),

    /// Another session for the same policy is already started.
    #[error("debugger is already running for policy '{policy_id}'")]
    AlreadyRunning { policy_id: PolicyId },

    /// The configuration file could not be parsed.
    #[error("invalid debugger config at {path}: {reason}")]
    Config { path: String, reason: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize debugger data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A notification sink failed (non-fatal).
    #[error("notification error: {0}")]
    NotificationError(String),
}
