// state.rs: DebugState, the lifecycle of a debug session.
//
//   Stopped ──start──▶ Started ──request arrives──▶ BreakAtNextBreakpoint
//   BreakAtNextLine / BreakAtNextBreakpoint ──boundary matches──▶ AtBreakpoint
//   AtBreakpoint ──step_into──▶ BreakAtNextLine
//   AtBreakpoint ──step_over/step_out/resume──▶ BreakAtNextBreakpoint
//   any ──stop / request finished──▶ Stopped

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugState {
    /// Not debugging. Pipeline hooks are no-ops.
    Stopped,
    /// Armed and waiting for the next request against the policy.
    Started,
    /// The next eligible assertion boundary pauses, regardless of breakpoints.
    BreakAtNextLine,
    /// Run until a breakpoint or the pending step target is reached.
    BreakAtNextBreakpoint,
    /// The worker is parked before an assertion.
    AtBreakpoint,
}

impl DebugState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, DebugState::Stopped)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, DebugState::AtBreakpoint)
    }
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugState::Stopped => write!(f, "stopped"),
            DebugState::Started => write!(f, "started"),
            DebugState::BreakAtNextLine => write!(f, "break_at_next_line"),
            DebugState::BreakAtNextBreakpoint => write!(f, "break_at_next_breakpoint"),
            DebugState::AtBreakpoint => write!(f, "at_breakpoint"),
        }
    }
}
