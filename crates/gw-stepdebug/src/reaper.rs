// reaper.rs: Background thread that terminates idle debug sessions.
//
// A controller that walks away leaves its session behind, possibly with a
// worker parked at a breakpoint. The reaper scans the manager on a fixed
// interval and terminates every session idle past the configured timeout,
// which also releases any parked worker.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::DebuggerConfig;
use crate::error::DebugError;
use crate::manager::DebugManager;

/// Handle to the running reaper thread. Dropping it stops the thread.
pub struct IdleReaper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IdleReaper {
    pub fn spawn(manager: Arc<DebugManager>, config: &DebuggerConfig) -> Result<Self, DebugError> {
        Self::spawn_with(manager, config.idle_scan_interval(), config.idle_timeout())
    }

    pub fn spawn_with(
        manager: Arc<DebugManager>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, DebugError> {
        let (shutdown, signal) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("stepdebug-reaper".to_string())
            .spawn(move || loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let reaped = manager.reap_idle(idle_timeout);
                        if !reaped.is_empty() {
                            tracing::info!(count = reaped.len(), "idle debug sessions reaped");
                        }
                    }
                    // Shutdown requested or handle dropped.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| DebugError::Io {
                path: "stepdebug-reaper thread".to_string(),
                source,
            })?;

        tracing::info!(
            interval_secs = interval.as_secs(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "idle reaper started"
        );
        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("idle reaper thread panicked");
            }
        }
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        self.stop();
    }
}
