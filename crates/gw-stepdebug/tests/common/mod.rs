// Shared helpers for the concurrency tests: a scripted policy walker that
// drives the pipeline hooks the way the execution engine does, and a
// controller-side poll that waits for the worker to park.

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gw_stepdebug::{
    AssertionInfo, AssertionPath, DebugManager, DebugState, DebugStatus, MessageState, PolicyId,
    RequestContext, TaskId, WaitOutcome,
};

pub const POLL: Duration = Duration::from_millis(50);
pub const DEADLINE: Duration = Duration::from_secs(3);

/// One executed assertion: where it sits and the variable it sets.
#[derive(Debug, Clone)]
pub struct Step {
    pub info: AssertionInfo,
    pub sets: Option<(&'static str, &'static str)>,
}

pub fn step(path: &[u32], ordinal: u32, sets: Option<(&'static str, &'static str)>) -> Step {
    let name = if sets.is_some() {
        "Set Context Variable"
    } else {
        "All assertion"
    };
    Step {
        info: AssertionInfo::new(AssertionPath::from(path), ordinal, name),
        sets,
    }
}

/// Execution order of this policy, where line 5 is an "at least one" whose
/// first branch (line 6) succeeds so the second branch (line 9) never runs:
///
///   1  All
///   2  Set output
///   3  Set output
///   4  Set output
///   5  At least one
///   6    All
///   7      Set output
///   8      Set output
///   9    All            (skipped)
///   10     Set output   (skipped)
///   11     Set output   (skipped)
///   12 Set done
pub fn nested_policy() -> Vec<Step> {
    vec![
        step(&[1], 1, None),
        step(&[2], 2, Some(("output", "out0"))),
        step(&[3], 3, Some(("output", "out0"))),
        step(&[4], 4, Some(("output", "out0"))),
        step(&[5], 5, None),
        step(&[6], 6, None),
        step(&[7], 7, Some(("output", "out1"))),
        step(&[8], 8, Some(("output", "out1"))),
        step(&[12], 12, Some(("done", "done"))),
    ]
}

pub fn path(segments: &[u32]) -> AssertionPath {
    AssertionPath::from(segments)
}

/// A request running on its own worker thread.
pub struct Request {
    pub handle: JoinHandle<RequestContext>,
    pub finished: Receiver<()>,
}

impl Request {
    pub fn is_finished_within(&self, timeout: Duration) -> bool {
        self.finished.recv_timeout(timeout).is_ok()
    }

    pub fn join(self) -> RequestContext {
        self.finished
            .recv_timeout(DEADLINE)
            .expect("request did not finish in time");
        self.handle.join().expect("worker panicked")
    }
}

/// Run `steps` against `policy_id` on a new worker thread.
pub fn spawn_request(manager: &Arc<DebugManager>, policy_id: &PolicyId, steps: Vec<Step>) -> Request {
    let manager = Arc::clone(manager);
    let policy_id = policy_id.clone();
    let (done_tx, finished) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut ctx =
            RequestContext::new().with_request(MessageState::new("text/xml", "<request/>"));
        manager.on_message_arrived(&mut ctx, &policy_id);
        for step in &steps {
            manager.on_start_assertion(&ctx, &step.info);
            if let Some((name, value)) = step.sets {
                ctx.set_variable(name, value);
            }
            manager.on_finish_assertion(&ctx);
        }
        manager.on_message_finished(&mut ctx);
        let _ = done_tx.send(());
        ctx
    });
    Request { handle, finished }
}

/// Poll like a controller until the session is parked at a breakpoint.
pub fn wait_until_paused(manager: &DebugManager, task: TaskId) -> DebugStatus {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if let WaitOutcome::Updated(status) = manager.wait_for_updates(task, POLL) {
            if status.state == DebugState::AtBreakpoint {
                return status;
            }
        }
    }
    panic!("session {} never reached a breakpoint", task);
}

/// Poll until the session reports Stopped (or is gone).
pub fn wait_until_stopped(manager: &DebugManager, task: TaskId) {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        match manager.get(task) {
            Some(session) if session.state() != DebugState::Stopped => {
                session.wait_for_updates(POLL);
            }
            _ => return,
        }
    }
    panic!("session {} never stopped", task);
}
