// session.rs: DebugSession, one debugging attachment to one request.
//
// A session is shared between exactly two kinds of threads:
//   - the worker executing the captured request, which calls the pipeline
//     hooks (`on_message_arrived`, `on_start_assertion`, ...) and may park
//     inside `on_start_assertion`
//   - controllers issuing commands (`step_into`, `resume`, `stop`, ...) and
//     polling with `wait_for_updates`
//
// All state lives behind one mutex. Two condition variables hang off it:
// `proceed` releases a parked worker, `updated` wakes a polling controller.
// Every mutation marks the session dirty and stamps the update time in the
// same critical section, so a poller never misses a batch of changes.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{AssertionInfo, EnforcementContext};
use crate::path::AssertionPath;
use crate::snapshot::{SnapshotProducer, VariableEntry};
use crate::state::DebugState;

/// Opaque, unique identifier of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of the policy a session debugs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PolicyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a controller sees when it polls a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugStatus {
    pub task_id: TaskId,
    pub policy_id: PolicyId,
    pub state: DebugState,
    pub current_path: Option<AssertionPath>,
    pub breakpoints: Vec<AssertionPath>,
    pub variables: Vec<VariableEntry>,
    pub terminated: bool,
    pub updated_at: DateTime<Utc>,
}

struct SessionInner {
    state: DebugState,
    breakpoints: HashSet<AssertionPath>,
    /// Set by step-over/step-out; consumed when the worker pauses.
    step_target: Option<AssertionPath>,
    current_path: Option<AssertionPath>,
    dirty: bool,
    last_update: Instant,
    updated_at: DateTime<Utc>,
    terminated: bool,
    watched: BTreeSet<String>,
    snapshot: SnapshotProducer,
}

impl SessionInner {
    fn touch(&mut self) {
        self.dirty = true;
        self.last_update = Instant::now();
        self.updated_at = Utc::now();
    }

    fn set_state(&mut self, state: DebugState) {
        self.state = state;
        self.touch();
    }

    fn refresh(&mut self, ctx: &dyn EnforcementContext) {
        self.snapshot.update(ctx, &self.watched);
    }

    fn should_break(&self, path: &AssertionPath) -> bool {
        match self.state {
            DebugState::BreakAtNextLine => true,
            DebugState::BreakAtNextBreakpoint => {
                self.breakpoints.contains(path)
                    || self
                        .step_target
                        .as_ref()
                        .is_some_and(|target| path.reached(target))
            }
            _ => false,
        }
    }
}

/// Per-task debugger state machine plus the worker/controller rendezvous.
pub struct DebugSession {
    task_id: TaskId,
    policy_id: PolicyId,
    inner: Mutex<SessionInner>,
    /// Signalled whenever the state may have left `AtBreakpoint`.
    proceed: Condvar,
    /// Signalled whenever the dirty flag is raised.
    updated: Condvar,
}

impl DebugSession {
    /// Create a session in the Stopped state.
    pub fn new(task_id: TaskId, policy_id: PolicyId) -> Self {
        Self {
            task_id,
            policy_id,
            inner: Mutex::new(SessionInner {
                state: DebugState::Stopped,
                breakpoints: HashSet::new(),
                step_target: None,
                current_path: None,
                dirty: false,
                last_update: Instant::now(),
                updated_at: Utc::now(),
                terminated: false,
                watched: BTreeSet::new(),
                snapshot: SnapshotProducer::new(),
            }),
            proceed: Condvar::new(),
            updated: Condvar::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn policy_id(&self) -> &PolicyId {
        &self.policy_id
    }

    pub fn state(&self) -> DebugState {
        self.lock().state
    }

    pub fn current_path(&self) -> Option<AssertionPath> {
        self.lock().current_path.clone()
    }

    /// Breakpoints in path order.
    pub fn breakpoints(&self) -> Vec<AssertionPath> {
        let mut breakpoints: Vec<_> = self.lock().breakpoints.iter().cloned().collect();
        breakpoints.sort();
        breakpoints
    }

    pub fn watched_variables(&self) -> Vec<String> {
        self.lock().watched.iter().cloned().collect()
    }

    pub fn variables(&self) -> Vec<VariableEntry> {
        self.lock().snapshot.entries().to_vec()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Time since the last state change or command.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_update.elapsed()
    }

    pub fn status(&self) -> DebugStatus {
        let inner = self.lock();
        let mut breakpoints: Vec<_> = inner.breakpoints.iter().cloned().collect();
        breakpoints.sort();
        DebugStatus {
            task_id: self.task_id,
            policy_id: self.policy_id.clone(),
            state: inner.state,
            current_path: inner.current_path.clone(),
            breakpoints,
            variables: inner.snapshot.entries().to_vec(),
            terminated: inner.terminated,
            updated_at: inner.updated_at,
        }
    }

    // ── Controller commands ──────────────────────────────────────

    /// Stopped → Started. Resets the snapshot to watched placeholders.
    pub fn start(&self) -> bool {
        let mut inner = self.lock();
        if inner.terminated || !inner.state.is_stopped() {
            tracing::debug!(task_id = %self.task_id, state = %inner.state, "start ignored");
            return false;
        }
        let SessionInner {
            snapshot, watched, ..
        } = &mut *inner;
        snapshot.reset(watched);
        inner.set_state(DebugState::Started);
        self.signal();
        tracing::debug!(task_id = %self.task_id, policy_id = %self.policy_id, "session started");
        true
    }

    /// Any state → Stopped. Returns whether the session was active.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        let was_active = !inner.state.is_stopped();
        inner.current_path = None;
        inner.step_target = None;
        inner.set_state(DebugState::Stopped);
        self.signal();
        if was_active {
            tracing::debug!(task_id = %self.task_id, "session stopped");
        }
        was_active
    }

    /// Pause at the very next eligible assertion.
    pub fn step_into(&self) {
        self.run_to(DebugState::BreakAtNextLine, None, "step_into");
    }

    /// Run until a breakpoint or until execution reaches `target`.
    pub fn step_over(&self, target: AssertionPath) {
        self.run_to(DebugState::BreakAtNextBreakpoint, Some(target), "step_over");
    }

    /// Same mechanics as [`step_over`](Self::step_over); the caller picks the
    /// target just past the enclosing composite.
    pub fn step_out(&self, target: AssertionPath) {
        self.run_to(DebugState::BreakAtNextBreakpoint, Some(target), "step_out");
    }

    /// Run until the next explicit breakpoint.
    pub fn resume(&self) {
        self.run_to(DebugState::BreakAtNextBreakpoint, None, "resume");
    }

    fn run_to(&self, state: DebugState, target: Option<AssertionPath>, command: &str) {
        let mut inner = self.lock();
        if inner.state.is_stopped() {
            tracing::debug!(task_id = %self.task_id, command, "ignored, session is stopped");
            return;
        }
        inner.step_target = target;
        inner.set_state(state);
        self.signal();
        tracing::debug!(
            task_id = %self.task_id,
            command,
            target = ?inner.step_target.as_ref().map(ToString::to_string),
            "execution released"
        );
    }

    /// Add the breakpoint if absent, remove it if present. Returns whether it
    /// is set afterwards. Does not release a parked worker.
    pub fn toggle_breakpoint(&self, path: AssertionPath) -> bool {
        let mut inner = self.lock();
        let set = if inner.breakpoints.remove(&path) {
            false
        } else {
            inner.breakpoints.insert(path);
            true
        };
        inner.touch();
        self.updated.notify_all();
        set
    }

    pub fn remove_all_breakpoints(&self) {
        let mut inner = self.lock();
        inner.breakpoints.clear();
        inner.touch();
        self.updated.notify_all();
    }

    pub fn add_watched_variable(&self, name: impl Into<String>) {
        let name = name.into();
        let mut inner = self.lock();
        inner.snapshot.add_watched(&name);
        inner.watched.insert(name);
        inner.touch();
        self.updated.notify_all();
    }

    pub fn remove_watched_variable(&self, name: &str) {
        let mut inner = self.lock();
        inner.watched.remove(name);
        inner.snapshot.remove_watched(name);
        inner.touch();
        self.updated.notify_all();
    }

    /// Stop and mark terminated. Any parked worker is released before this
    /// returns. Returns whether the session was active.
    pub fn terminate(&self) -> bool {
        let mut inner = self.lock();
        let was_active = !inner.state.is_stopped();
        inner.current_path = None;
        inner.step_target = None;
        inner.terminated = true;
        inner.set_state(DebugState::Stopped);
        self.signal();
        tracing::debug!(task_id = %self.task_id, "session terminated");
        was_active
    }

    /// Block the calling controller until the session changes or `max_wait`
    /// elapses. Changes since the previous `true` return are coalesced.
    pub fn wait_for_updates(&self, max_wait: Duration) -> bool {
        let inner = self.lock();
        let mut inner = match self
            .updated
            .wait_timeout_while(inner, max_wait, |s| !s.dirty)
        {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
        if inner.dirty {
            inner.dirty = false;
            true
        } else {
            false
        }
    }

    // ── Pipeline hooks (worker thread) ───────────────────────────

    /// The captured request has arrived. Attaches this session to `ctx`.
    pub fn on_message_arrived(&self, ctx: &mut dyn EnforcementContext) {
        {
            let mut inner = self.lock();
            if inner.state.is_stopped() {
                return;
            }
            inner.current_path = None;
            inner.refresh(&*ctx);
            inner.set_state(DebugState::BreakAtNextBreakpoint);
            self.signal();
        }
        ctx.set_debug_task(Some(self.task_id));
        tracing::debug!(task_id = %self.task_id, policy_id = %self.policy_id, "request captured");
    }

    /// Called before each assertion. Parks the worker when a breakpoint, the
    /// pending step target, or a step-into lands on this assertion.
    pub fn on_start_assertion(&self, ctx: &dyn EnforcementContext, info: &AssertionInfo) {
        let mut inner = self.lock();
        if inner.state.is_stopped() {
            return;
        }
        inner.current_path = Some(info.path.clone());
        inner.refresh(ctx);

        if info.is_policy_root() || !inner.should_break(&info.path) {
            return;
        }

        inner.step_target = None;
        inner.set_state(DebugState::AtBreakpoint);
        self.updated.notify_all();
        tracing::debug!(
            task_id = %self.task_id,
            path = %info.path,
            assertion = %info.name,
            "paused at breakpoint"
        );

        while inner.state == DebugState::AtBreakpoint {
            inner = match self.proceed.wait(inner) {
                Ok(guard) => guard,
                Err(poisoned) => {
                    // A controller panicked mid-command; carry on as if resumed.
                    tracing::warn!(task_id = %self.task_id, "lock poisoned while paused, resuming");
                    let mut guard = poisoned.into_inner();
                    if guard.state == DebugState::AtBreakpoint {
                        guard.set_state(DebugState::BreakAtNextBreakpoint);
                        self.updated.notify_all();
                    }
                    guard
                }
            };
        }
        tracing::debug!(task_id = %self.task_id, state = %inner.state, "resumed");
    }

    /// Called after each assertion. Never blocks.
    pub fn on_finish_assertion(&self, ctx: &dyn EnforcementContext) {
        let mut inner = self.lock();
        if !inner.state.is_stopped() {
            inner.refresh(ctx);
        }
    }

    /// Final refresh, then an unconditional stop. Returns whether the session
    /// was active.
    pub fn on_message_finished(&self, ctx: &dyn EnforcementContext) -> bool {
        {
            let mut inner = self.lock();
            if !inner.terminated {
                inner.refresh(ctx);
            }
        }
        self.stop()
    }

    fn signal(&self) {
        // Harmless when nobody waits yet; the worker re-checks state under the lock.
        self.proceed.notify_all();
        self.updated.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(task_id = %self.task_id, "recovered poisoned session lock");
            poisoned.into_inner()
        })
    }
}

impl fmt::Debug for DebugSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSession")
            .field("task_id", &self.task_id)
            .field("policy_id", &self.policy_id)
            .finish_non_exhaustive()
    }
}
