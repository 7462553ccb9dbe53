// End-to-end debugging of a request running on a real worker thread.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use gw_stepdebug::{DebugManager, DebugState, EnforcementContext, PolicyId};

fn setup() -> (Arc<DebugManager>, PolicyId) {
    (Arc::new(DebugManager::default()), PolicyId::from("policy-12345"))
}

#[test]
fn request_runs_untouched_when_debugger_not_started() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());

    let ctx = spawn_request(&manager, &policy, nested_policy()).join();
    assert!(ctx.debug_task().is_none());
    assert_eq!(manager.get(task).unwrap().state(), DebugState::Stopped);
}

#[test]
fn started_without_breakpoints_runs_to_completion() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.start(task).unwrap();

    spawn_request(&manager, &policy, nested_policy()).join();
    let session = manager.get(task).unwrap();
    assert_eq!(session.state(), DebugState::Stopped);
    assert!(session.current_path().is_none());
}

#[test]
fn breakpoint_parks_worker_until_stopped() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[6])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[6])));
    assert!(!request.is_finished_within(Duration::from_millis(100)));

    manager.stop(task).unwrap();
    assert_eq!(manager.get(task).unwrap().state(), DebugState::Stopped);
    request.join();
}

#[test]
fn snapshot_at_breakpoint_shows_live_variables() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[3])).unwrap();
    manager.add_watched_variable(task, "done").unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    let status = wait_until_paused(&manager, task);

    let output = status
        .variables
        .iter()
        .find(|v| v.name == "output" && !v.user_added)
        .expect("output should be set by line 2");
    assert_eq!(output.value.as_deref(), Some("out0"));
    assert!(status.variables.iter().any(|v| v.name == "request"));
    let done = status.variables.iter().find(|v| v.name == "done").unwrap();
    assert!(done.is_unset());

    manager.resume(task).unwrap();
    request.join();
}

#[test]
fn step_over_pauses_at_target() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[2])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    manager.step_over(task, path(&[3])).unwrap();

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[3])));

    manager.stop(task).unwrap();
    request.join();
}

#[test]
fn step_over_skipped_target_pauses_at_next_reached_line() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[6])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    // Line 9 is never executed; execution moves from 8 straight to 12.
    manager.step_over(task, path(&[9])).unwrap();

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[12])));

    manager.stop(task).unwrap();
    request.join();
}

#[test]
fn step_out_pauses_past_enclosing_composite() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[7])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    manager.step_out(task, path(&[9])).unwrap();

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[12])));

    manager.stop(task).unwrap();
    request.join();
}

#[test]
fn step_into_pauses_at_next_line() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[6])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    manager.step_into(task).unwrap();

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[7])));

    manager.stop(task).unwrap();
    request.join();
}

#[test]
fn resume_without_more_breakpoints_completes_request() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[4])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    manager.resume(task).unwrap();

    let ctx = request.join();
    assert!(ctx.debug_task().is_none());
    assert_eq!(manager.get(task).unwrap().state(), DebugState::Stopped);
}

#[test]
fn resume_with_more_breakpoints_pauses_at_next() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[3])).unwrap();
    manager.toggle_breakpoint(task, path(&[8])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    manager.resume(task).unwrap();

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[8])));

    manager.stop(task).unwrap();
    request.join();
}

#[test]
fn toggled_off_breakpoint_does_not_pause() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[4])).unwrap();
    manager.toggle_breakpoint(task, path(&[4])).unwrap();
    manager.start(task).unwrap();

    spawn_request(&manager, &policy, nested_policy()).join();
    assert_eq!(manager.get(task).unwrap().state(), DebugState::Stopped);
}

#[test]
fn removed_breakpoints_do_not_pause() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[4])).unwrap();
    manager.toggle_breakpoint(task, path(&[7])).unwrap();
    manager.remove_all_breakpoints(task).unwrap();
    manager.start(task).unwrap();

    spawn_request(&manager, &policy, nested_policy()).join();
    assert_eq!(manager.get(task).unwrap().state(), DebugState::Stopped);
}

#[test]
fn terminate_at_breakpoint_releases_worker_and_unregisters() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[3])).unwrap();
    manager.toggle_breakpoint(task, path(&[8])).unwrap();
    manager.start(task).unwrap();

    let request = spawn_request(&manager, &policy, nested_policy());
    wait_until_paused(&manager, task);
    let session = manager.get(task).unwrap();

    assert!(manager.terminate(task));
    assert!(session.is_terminated());
    assert!(manager.get(task).is_none());

    // The later breakpoint at 8 must not catch the orphaned request.
    let ctx = request.join();
    assert!(ctx.variable("done").is_some());
}

#[test]
fn step_into_from_breakpoint_pauses_again_inside_nested_fragment() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[3])).unwrap();
    manager.start(task).unwrap();

    // Line 3 includes a policy fragment whose first step sits at [3, 1].
    let steps = vec![
        step(&[1], 1, None),
        step(&[2], 2, None),
        step(&[3], 3, None),
        step(&[3, 1], 4, Some(("inner", "yes"))),
        step(&[4], 5, None),
    ];
    let request = spawn_request(&manager, &policy, steps);

    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[3])));

    manager.step_into(task).unwrap();
    let status = wait_until_paused(&manager, task);
    assert_eq!(status.current_path, Some(path(&[3, 1])));

    manager.resume(task).unwrap();
    request.join();
}

#[test]
fn session_can_be_restarted_for_the_next_request() {
    let (manager, policy) = setup();
    let task = manager.create(policy.clone());
    manager.toggle_breakpoint(task, path(&[2])).unwrap();

    for _ in 0..2 {
        manager.start(task).unwrap();
        let request = spawn_request(&manager, &policy, nested_policy());
        wait_until_paused(&manager, task);
        manager.resume(task).unwrap();
        request.join();
        wait_until_stopped(&manager, task);
    }
}
