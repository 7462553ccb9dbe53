// config.rs: Debugger configuration.
//
// Only the idle reaper and the notification log consume configuration. The
// file is TOML, e.g. `stepdebug.toml`:
//
//   idle_scan_interval_secs = 3600
//   idle_timeout_secs = 86400
//   events_log = "/var/log/gateway/debug-events.jsonl"

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DebugError;

const DEFAULT_IDLE_SCAN_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Configuration for the step debugger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// How often the reaper scans for idle sessions.
    pub idle_scan_interval_secs: u64,

    /// Sessions without an update for this long are terminated.
    pub idle_timeout_secs: u64,

    /// Optional JSONL file receiving debugger notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_log: Option<PathBuf>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            idle_scan_interval_secs: DEFAULT_IDLE_SCAN_INTERVAL_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            events_log: None,
        }
    }
}

impl DebuggerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, DebugError> {
        toml::from_str(content).map_err(|e| DebugError::Config {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DebugError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DebugError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| DebugError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DebugError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no debugger config, using defaults");
            Ok(Self::default())
        }
    }

    pub fn idle_scan_interval(&self) -> Duration {
        Duration::from_secs(self.idle_scan_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_hour_scan_day_timeout() {
        let config = DebuggerConfig::default();
        assert_eq!(config.idle_scan_interval(), Duration::from_secs(3600));
        assert_eq!(config.idle_timeout(), Duration::from_secs(86400));
        assert!(config.events_log.is_none());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = DebuggerConfig::from_toml_str("idle_timeout_secs = 30").unwrap();
        assert_eq!(config.idle_timeout_secs, 30);
        assert_eq!(config.idle_scan_interval_secs, 3600);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = DebuggerConfig::from_toml_str("idle_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, DebugError::Config { .. }));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stepdebug.toml");
        fs::write(
            &path,
            "idle_scan_interval_secs = 5\nevents_log = \"events.jsonl\"\n",
        )
        .unwrap();

        let config = DebuggerConfig::load(&path).unwrap();
        assert_eq!(config.idle_scan_interval_secs, 5);
        assert_eq!(config.events_log, Some(PathBuf::from("events.jsonl")));

        let missing = DebuggerConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, DebuggerConfig::default());
        assert!(matches!(
            DebuggerConfig::load(dir.path().join("absent.toml")),
            Err(DebugError::Io { .. })
        ));
    }
}
