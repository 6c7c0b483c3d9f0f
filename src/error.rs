//! Error types for paramsync.
//!
//! Steady-state failures never leave the worker thread as errors; they are
//! logged and the step is skipped. The variants here describe what went wrong
//! so the caller's recovery branch can decide between retrying next tick and
//! moving the session to its terminal phase.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for paramsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing parameters.
#[derive(Error, Debug)]
pub enum SyncError {
    // File Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Mailbox Errors
    #[error("Mailbox slot is still occupied: {path}")]
    SlotOccupied { path: PathBuf },

    #[error("Unexpected message in {path}: expected {expected}")]
    UnexpectedMessage {
        path: PathBuf,
        expected: &'static str,
    },

    // Handshake Errors
    #[error("Directory path is {len} bytes, payload holds at most {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("Invalid handshake payload: {reason}")]
    InvalidPayload { reason: String },

    // Snapshot Errors
    #[error("Snapshot checksum mismatch: {path}")]
    ChecksumMismatch { path: PathBuf },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Failed to start sync worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns true if the operation can simply be retried on a later tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::FileReadError { .. }
                | SyncError::FileWriteError { .. }
                | SyncError::SlotOccupied { .. }
                | SyncError::Io(_)
        )
    }

    /// Returns a short hint for the operator.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::SlotOccupied { .. } => {
                Some("The peer has not consumed the last message yet; it will be retried.")
            }
            SyncError::PathTooLong { .. } => {
                Some("Move the parameter directory to a shorter path.")
            }
            SyncError::ChecksumMismatch { .. } => {
                Some("The snapshot was damaged; it has been set aside and state starts fresh.")
            }
            SyncError::DirectoryCreateError { .. } => {
                Some("Check permissions of the parameter directory.")
            }
            SyncError::InvalidConfig { .. } => Some("Fix the configuration file and restart."),
            _ => None,
        }
    }
}
