// manager.rs: DebugManager, the registry and lifecycle owner of debug sessions.
//
// The manager is shared (behind an `Arc`) by the admin façade and the message
// pipeline. It owns two registries under one mutex:
//   - sessions: task id → session (every live session)
//   - armed:    policy id → session (started, waiting for the next request)
//
// Lock ordering: the registry lock may be held while a session lock is taken,
// never the reverse. Sessions hold no reference back to the manager, and
// every hook that can block (on_start_assertion) or wait (wait_for_updates)
// runs after the registry lock has been released. Sinks must not call back
// into the manager: on_message_finished dispatches under the registry lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::context::{AssertionInfo, EnforcementContext};
use crate::error::DebugError;
use crate::events::{DebugEvent, EventDispatcher};
use crate::path::AssertionPath;
use crate::session::{DebugSession, DebugStatus, PolicyId, TaskId};

/// Result of polling a session for changes.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The session changed; here is its current state.
    Updated(DebugStatus),
    /// Nothing changed within the wait window.
    NoChange,
    /// The session was terminated (or never existed).
    Terminated,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<TaskId, Arc<DebugSession>>,
    armed: HashMap<PolicyId, Arc<DebugSession>>,
}

impl Registry {
    fn disarm(&mut self, session: &Arc<DebugSession>) {
        let is_armed = self
            .armed
            .get(session.policy_id())
            .is_some_and(|armed| Arc::ptr_eq(armed, session));
        if is_armed {
            self.armed.remove(session.policy_id());
        }
    }
}

/// Owns every debug session and routes controller commands and pipeline
/// hooks to them.
#[derive(Default)]
pub struct DebugManager {
    registry: Mutex<Registry>,
    events: EventDispatcher,
}

impl DebugManager {
    pub fn new(events: EventDispatcher) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            events,
        }
    }

    // ── Admin operations ─────────────────────────────────────────

    /// Create a Stopped, unarmed session for `policy_id`.
    pub fn create(&self, policy_id: impl Into<PolicyId>) -> TaskId {
        let policy_id = policy_id.into();
        let task_id = TaskId::new();
        let session = Arc::new(DebugSession::new(task_id, policy_id.clone()));
        self.lock().sessions.insert(task_id, session);
        tracing::info!(task_id = %task_id, policy_id = %policy_id, "debug session created");
        task_id
    }

    pub fn get(&self, task_id: TaskId) -> Option<Arc<DebugSession>> {
        self.lock().sessions.get(&task_id).cloned()
    }

    /// Arm the session to capture the next request against its policy.
    ///
    /// Fails with [`DebugError::AlreadyRunning`] while any session for the
    /// same policy (this one included) is not Stopped. The check and the arm
    /// happen under the registry lock, so two concurrent starts for one
    /// policy cannot both succeed.
    pub fn start(&self, task_id: TaskId) -> Result<(), DebugError> {
        let session = {
            let mut registry = self.lock();
            let session = registry
                .sessions
                .get(&task_id)
                .cloned()
                .ok_or(DebugError::TaskNotFound(task_id))?;

            let conflict = registry
                .sessions
                .values()
                .any(|s| s.policy_id() == session.policy_id() && !s.state().is_stopped());
            if conflict || !session.start() {
                return Err(DebugError::AlreadyRunning {
                    policy_id: session.policy_id().clone(),
                });
            }
            registry
                .armed
                .insert(session.policy_id().clone(), Arc::clone(&session));
            session
        };

        tracing::info!(task_id = %task_id, policy_id = %session.policy_id(), "debugging enabled");
        self.events
            .dispatch(&DebugEvent::debugging_enabled(task_id, session.policy_id()));
        Ok(())
    }

    /// De-arm and stop the session.
    pub fn stop(&self, task_id: TaskId) -> Result<(), DebugError> {
        let session = {
            let mut registry = self.lock();
            let session = registry
                .sessions
                .get(&task_id)
                .cloned()
                .ok_or(DebugError::TaskNotFound(task_id))?;
            registry.disarm(&session);
            session
        };
        if session.stop() {
            self.publish_disabled(&session);
        }
        Ok(())
    }

    pub fn step_over(&self, task_id: TaskId, target: AssertionPath) -> Result<(), DebugError> {
        self.session(task_id)?.step_over(target);
        Ok(())
    }

    pub fn step_into(&self, task_id: TaskId) -> Result<(), DebugError> {
        self.session(task_id)?.step_into();
        Ok(())
    }

    pub fn step_out(&self, task_id: TaskId, target: AssertionPath) -> Result<(), DebugError> {
        self.session(task_id)?.step_out(target);
        Ok(())
    }

    pub fn resume(&self, task_id: TaskId) -> Result<(), DebugError> {
        self.session(task_id)?.resume();
        Ok(())
    }

    pub fn toggle_breakpoint(&self, task_id: TaskId, path: AssertionPath) -> Result<(), DebugError> {
        self.session(task_id)?.toggle_breakpoint(path);
        Ok(())
    }

    pub fn remove_all_breakpoints(&self, task_id: TaskId) -> Result<(), DebugError> {
        self.session(task_id)?.remove_all_breakpoints();
        Ok(())
    }

    pub fn add_watched_variable(&self, task_id: TaskId, name: &str) -> Result<(), DebugError> {
        self.session(task_id)?.add_watched_variable(name);
        Ok(())
    }

    pub fn remove_watched_variable(&self, task_id: TaskId, name: &str) -> Result<(), DebugError> {
        self.session(task_id)?.remove_watched_variable(name);
        Ok(())
    }

    /// Stop, mark terminated and unregister. Idempotent: returns whether a
    /// session was removed.
    ///
    /// A worker parked at a breakpoint is released while the session is still
    /// registered, so it can never be stranded on an unreachable session.
    pub fn terminate(&self, task_id: TaskId) -> bool {
        let (session, was_active) = {
            let mut registry = self.lock();
            let Some(session) = registry.sessions.get(&task_id).cloned() else {
                return false;
            };
            registry.disarm(&session);
            let was_active = session.terminate();
            registry.sessions.remove(&task_id);
            (session, was_active)
        };

        tracing::info!(task_id = %task_id, policy_id = %session.policy_id(), "debug session terminated");
        if was_active {
            self.publish_disabled(&session);
        }
        self.events
            .dispatch(&DebugEvent::session_terminated(task_id, session.policy_id()));
        true
    }

    /// Block the caller up to `max_wait` for a change to the session.
    pub fn wait_for_updates(&self, task_id: TaskId, max_wait: Duration) -> WaitOutcome {
        let Some(session) = self.get(task_id) else {
            return WaitOutcome::Terminated;
        };
        let updated = session.wait_for_updates(max_wait);
        if session.is_terminated() {
            WaitOutcome::Terminated
        } else if updated {
            WaitOutcome::Updated(session.status())
        } else {
            WaitOutcome::NoChange
        }
    }

    /// Terminate every session.
    pub fn cleanup(&self) {
        let task_ids: Vec<TaskId> = self.lock().sessions.keys().copied().collect();
        for task_id in task_ids {
            self.terminate(task_id);
        }
    }

    /// Terminate every session idle for longer than `threshold`. Returns the
    /// terminated task ids.
    pub fn reap_idle(&self, threshold: Duration) -> Vec<TaskId> {
        let idle: Vec<TaskId> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.idle_for() > threshold)
            .map(|s| s.task_id())
            .collect();

        let mut reaped = Vec::with_capacity(idle.len());
        for task_id in idle {
            if self.terminate(task_id) {
                tracing::info!(task_id = %task_id, "reaped idle debug session");
                reaped.push(task_id);
            }
        }
        reaped
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// The session currently armed for `policy_id`, if any.
    pub fn armed_task(&self, policy_id: &PolicyId) -> Option<TaskId> {
        self.lock().armed.get(policy_id).map(|s| s.task_id())
    }

    // ── Pipeline hooks ───────────────────────────────────────────
    //
    // These never fail the request: unknown or terminated sessions turn
    // every hook into a no-op.

    /// Capture the request if a session is armed for `policy_id`. Single-shot:
    /// the armed entry is consumed.
    ///
    /// Consuming the arm and attaching the request happen under one registry
    /// guard, so a concurrent stop/start cannot re-arm the session in between.
    pub fn on_message_arrived(&self, ctx: &mut dyn EnforcementContext, policy_id: &PolicyId) {
        let mut registry = self.lock();
        if let Some(session) = registry.armed.remove(policy_id) {
            session.on_message_arrived(ctx);
        }
    }

    pub fn on_start_assertion(&self, ctx: &dyn EnforcementContext, info: &AssertionInfo) {
        if let Some(session) = self.attached(ctx) {
            session.on_start_assertion(ctx, info);
        }
    }

    pub fn on_finish_assertion(&self, ctx: &dyn EnforcementContext) {
        if let Some(session) = self.attached(ctx) {
            session.on_finish_assertion(ctx);
        }
    }

    /// Forward the finish event, then stop the attached session and detach
    /// it from the request.
    ///
    /// The registry guard spans disarm, stop and the "disabled" event: a
    /// controller woken by the stop can only restart the session after this
    /// returns, and its re-arm and "enabled" event land after ours.
    pub fn on_message_finished(&self, ctx: &mut dyn EnforcementContext) {
        let Some(session) = self.attached(&*ctx) else {
            return;
        };
        {
            let mut registry = self.lock();
            registry.disarm(&session);
            if session.on_message_finished(&*ctx) {
                self.publish_disabled(&session);
            }
        }
        ctx.set_debug_task(None);
    }

    // ── Internals ────────────────────────────────────────────────

    fn attached(&self, ctx: &dyn EnforcementContext) -> Option<Arc<DebugSession>> {
        let task_id = ctx.debug_task()?;
        self.get(task_id)
    }

    fn session(&self, task_id: TaskId) -> Result<Arc<DebugSession>, DebugError> {
        self.get(task_id).ok_or(DebugError::TaskNotFound(task_id))
    }

    fn publish_disabled(&self, session: &DebugSession) {
        tracing::info!(task_id = %session.task_id(), policy_id = %session.policy_id(), "debugging disabled");
        self.events.dispatch(&DebugEvent::debugging_disabled(
            session.task_id(),
            session.policy_id(),
        ));
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovered poisoned debug registry lock");
            poisoned.into_inner()
        })
    }
}
