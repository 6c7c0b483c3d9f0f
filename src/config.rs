//! Session configuration.
//!
//! Defaults match the values both peers were historically compiled with, so
//! an unconfigured host and an unconfigured editor find each other.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::state::version::PROTOCOL_VERSION;

/// Well-known rendezvous port.
pub const DEFAULT_PORT: u16 = 52823;

/// Default host-local directory, also proposed as the shared directory.
pub const DEFAULT_LOCAL_DIR: &str = "ParameterEditor";

/// How session steps are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// A dedicated worker thread runs one step per tick.
    Background,
    /// `tick` runs the step on the calling thread.
    Inline,
}

/// Configuration shared by both roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// TCP port used for the rendezvous. The editor may use 0 to let the OS pick.
    pub port: u16,

    /// Protocol version compiled into this side.
    pub protocol_version: u32,

    /// Host persistent directory (version marker, snapshot, mailboxes).
    pub local_dir: PathBuf,

    /// Interval between snapshot saves while running.
    pub snapshot_interval_ms: u64,

    /// Upper bound on one connect attempt by the host.
    pub connect_timeout_ms: u64,

    /// Upper bound on reading the directory payload by the editor.
    pub handshake_read_timeout_ms: u64,

    pub step_mode: StepMode,

    /// When false, no synchronization happens and the store is local only.
    pub enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            protocol_version: PROTOCOL_VERSION,
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
            snapshot_interval_ms: 500,
            connect_timeout_ms: 50,
            handshake_read_timeout_ms: 2000,
            step_mode: StepMode::Background,
            enabled: true,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SyncError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: SyncConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would wedge a session.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(SyncError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.snapshot_interval_ms == 0 {
            return invalid("snapshot_interval_ms must be positive");
        }
        if self.connect_timeout_ms == 0 {
            return invalid("connect_timeout_ms must be positive");
        }
        if self.handshake_read_timeout_ms == 0 {
            return invalid("handshake_read_timeout_ms must be positive");
        }
        if self.local_dir.as_os_str().is_empty() {
            return invalid("local_dir must not be empty");
        }
        Ok(())
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    pub fn with_step_mode(mut self, mode: StepMode) -> Self {
        self.step_mode = mode;
        self
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_read_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.port, 52823);
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.snapshot_interval(), Duration::from_millis(500));
        assert_eq!(config.step_mode, StepMode::Background);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("paramsync.json");
        fs::write(&path, r#"{"port": 40000, "step_mode": "inline"}"#).unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 40000);
        assert_eq!(config.step_mode, StepMode::Inline);
        assert_eq!(config.local_dir, PathBuf::from(DEFAULT_LOCAL_DIR));
    }

    #[test]
    fn test_from_file_rejects_zero_interval() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("paramsync.json");
        fs::write(&path, r#"{"snapshot_interval_ms": 0}"#).unwrap();

        assert!(matches!(
            SyncConfig::from_file(&path),
            Err(SyncError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = SyncConfig::from_file(Path::new("/nonexistent/paramsync.json"));
        assert!(matches!(result, Err(SyncError::FileReadError { .. })));
    }
}
