//! Protocol version and the persistent version marker.
//!
//! The marker (`version.dat`) remembers which protocol version last used the
//! host directory, so a version change is detected before any peer connects.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::state::storage;

/// Protocol version compiled into this build. Compared, never negotiated.
pub const PROTOCOL_VERSION: u32 = 1;

/// Marker file name inside the host directory.
pub const VERSION_FILE: &str = "version.dat";

/// Contents of `version.dat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker {
    pub protocol_version: u32,
    pub written_at: DateTime<Utc>,
}

/// Outcome of comparing the marker against the compiled version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerCheck {
    /// No marker existed; one has been written.
    Created,
    /// Marker matches the compiled version.
    Matches,
    /// Marker was written by a different protocol version.
    Mismatch { found: u32 },
}

/// Read the marker in `dir`, if any.
pub fn read_marker(dir: &Path) -> Result<Option<VersionMarker>> {
    let path = dir.join(VERSION_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| SyncError::FileReadError {
        path: path.clone(),
        source: e,
    })?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write a marker for `version` into `dir`.
pub fn write_marker(dir: &Path, version: u32) -> Result<VersionMarker> {
    let marker = VersionMarker {
        protocol_version: version,
        written_at: Utc::now(),
    };
    let content = serde_json::to_vec_pretty(&marker)?;
    storage::write_atomic(&dir.join(VERSION_FILE), &content)?;
    Ok(marker)
}

/// Compare the marker in `dir` with `compiled`, writing one if missing.
///
/// A marker that exists but cannot be parsed counts as a mismatch with
/// version 0, since its writer is unknown.
pub fn check_marker(dir: &Path, compiled: u32) -> Result<MarkerCheck> {
    match read_marker(dir) {
        Ok(Some(marker)) if marker.protocol_version == compiled => Ok(MarkerCheck::Matches),
        Ok(Some(marker)) => Ok(MarkerCheck::Mismatch {
            found: marker.protocol_version,
        }),
        Ok(None) => {
            write_marker(dir, compiled)?;
            Ok(MarkerCheck::Created)
        }
        Err(SyncError::Json(e)) => {
            log::warn!("Unreadable version marker in {}: {}", dir.display(), e);
            Ok(MarkerCheck::Mismatch { found: 0 })
        }
        Err(e) => Err(e),
    }
}
