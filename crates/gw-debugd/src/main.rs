//! # gw-debugd
//!
//! Operator harness for the gateway policy step debugger.
//!
//! Wires a [`DebugManager`] and its idle reaper the way the gateway does,
//! then replays a scripted policy on a worker thread while the main thread
//! acts as the debugging client: every change is printed as JSON and each
//! pause is answered with a resume (or a step-into with `--step`).
//!
//! ## Usage
//!
//! ```text
//! gw-debugd --list
//! gw-debugd --breakpoint 3 --breakpoint 8 --watch output --watch missing
//! gw-debugd --breakpoint 2 --step --config stepdebug.toml
//! ```

mod demo;

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gw_stepdebug::{
    AssertionPath, DebugManager, DebugState, DebuggerConfig, EventDispatcher, IdleReaper, LogSink,
    MessageState, PolicyId, RequestContext, TaskId, TracingSink, WaitOutcome,
};

/// Replay a policy under the step debugger.
#[derive(Parser)]
#[command(name = "gw-debugd", about = "Gateway policy step debugger harness")]
struct Cli {
    /// Debugger configuration file (TOML).
    #[arg(long, default_value = "stepdebug.toml")]
    config: PathBuf,

    /// Breakpoint as a dotted assertion path (repeatable).
    #[arg(long = "breakpoint", value_name = "PATH")]
    breakpoints: Vec<AssertionPath>,

    /// Context variable to watch (repeatable).
    #[arg(long = "watch", value_name = "NAME")]
    watches: Vec<String>,

    /// Step into the next line at every pause instead of resuming.
    #[arg(long)]
    step: bool,

    /// Controller poll interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,

    /// Print the numbered policy and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the JSON status stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gw_stepdebug=info".parse()?)
                .add_directive("gw_debugd=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let policy = demo::demo_policy();

    if cli.list {
        for line in demo::listing(&policy) {
            println!("{}", line);
        }
        return Ok(());
    }

    let config = DebuggerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let mut events = EventDispatcher::new();
    events.add_sink(Box::new(TracingSink));
    if let Some(path) = &config.events_log {
        let sink = LogSink::open(path)
            .with_context(|| format!("opening events log {}", path.display()))?;
        events.add_sink(Box::new(sink));
    }
    let manager = Arc::new(DebugManager::new(events));
    let reaper = IdleReaper::spawn(Arc::clone(&manager), &config)?;

    let policy_id = PolicyId::from("demo-policy");
    let task = manager.create(policy_id.clone());
    for breakpoint in cli.breakpoints {
        manager.toggle_breakpoint(task, breakpoint)?;
    }
    for name in &cli.watches {
        manager.add_watched_variable(task, name)?;
    }
    manager.start(task)?;

    let (done_tx, done_rx) = mpsc::channel();
    let worker = {
        let manager = Arc::clone(&manager);
        let policy_id = policy_id.clone();
        thread::Builder::new()
            .name("policy-worker".to_string())
            .spawn(move || {
                let mut ctx = RequestContext::new()
                    .with_request(MessageState::new("text/xml", "<demo/>"));
                let passed = demo::process_request(&manager, &policy_id, &policy, &mut ctx);
                let _ = done_tx.send(passed);
            })
            .context("spawning policy worker")?
    };

    let passed = drive(&manager, task, Duration::from_millis(cli.poll_ms), cli.step, &done_rx)?;

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("policy worker panicked"))?;
    tracing::info!(passed, "request finished");

    manager.terminate(task);
    reaper.shutdown();
    Ok(())
}

/// Controller loop: print every status change and answer each pause until
/// the worker reports its result on `done`.
fn drive(
    manager: &DebugManager,
    task: TaskId,
    poll: Duration,
    step: bool,
    done: &Receiver<bool>,
) -> Result<bool> {
    loop {
        match manager.wait_for_updates(task, poll) {
            WaitOutcome::Updated(status) => {
                println!("{}", serde_json::to_string(&status)?);
                if status.state == DebugState::AtBreakpoint {
                    if step {
                        manager.step_into(task)?;
                    } else {
                        manager.resume(task)?;
                    }
                }
            }
            WaitOutcome::NoChange => {}
            WaitOutcome::Terminated => {
                // Nothing left to poll; the worker is no longer held by the session.
                tracing::warn!(task_id = %task, "session terminated before the request finished");
                return done
                    .recv()
                    .map_err(|_| anyhow::anyhow!("policy worker exited without a result"));
            }
        }
        match done.try_recv() {
            Ok(passed) => return Ok(passed),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                anyhow::bail!("policy worker exited without a result")
            }
        }
    }
}
