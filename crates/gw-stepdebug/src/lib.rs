//! # gw-stepdebug
//!
//! Step debugger for gateway policy evaluation.
//!
//! A controller (admin caller) attaches a [`DebugSession`] to a policy, arms it,
//! and the next request evaluated against that policy is captured. The worker
//! thread executing the request calls the pipeline hooks on
//! [`DebugManager`] at message and assertion boundaries; when a breakpoint or
//! step target is reached the worker parks until the controller resumes,
//! steps, stops or terminates the session.
//!
//! ## Key components
//!
//! - [`AssertionPath`]: structural position of an assertion, used as a
//!   breakpoint key
//! - [`DebugSession`]: per-task state machine and the worker/controller
//!   rendezvous
//! - [`DebugManager`]: session registry, "one active session per policy",
//!   request capture and idle reaping
//! - [`SnapshotProducer`]: turns live request/response/variable state into
//!   inspectable [`VariableEntry`] rows
//! - [`EventDispatcher`]: fire-and-forget "debugging enabled/disabled"
//!   notifications
//!
//! ## Key invariants
//!
//! - At most one non-Stopped session per policy.
//! - The manager lock is always taken before a session lock, never after.
//! - A worker parked at a breakpoint is released before its session leaves
//!   the registry.
//! - No hook ever fails the request being processed.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod manager;
pub mod path;
pub mod reaper;
pub mod session;
pub mod snapshot;
pub mod state;

pub use config::DebuggerConfig;
pub use context::{
    AssertionInfo, EnforcementContext, MessageState, RequestContext, VariableValue, ROOT_ORDINAL,
};
pub use error::DebugError;
pub use events::{DebugEvent, EventDispatcher, LogSink, NotificationSink, TracingSink};
pub use manager::{DebugManager, WaitOutcome};
pub use path::AssertionPath;
pub use reaper::IdleReaper;
pub use session::{DebugSession, DebugStatus, PolicyId, TaskId};
pub use snapshot::{SnapshotProducer, VariableEntry};
pub use state::DebugState;
