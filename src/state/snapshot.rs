//! Snapshot Persistence
//!
//! The full synchronized state (values received from the peer plus the local
//! editable values) is written to `save.dat` periodically by the editor's
//! worker and read once: by the host at startup and by the editor when the
//! shared directory is agreed.
//!
//! A snapshot that fails to parse or whose checksum does not match is moved
//! aside as `save_corrupt_YYYYMMDD_HHMMSS.dat` and treated as absent.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::color::ColorParameterSet;
use crate::error::{Result, SyncError};
use crate::state::storage;

/// Snapshot file name inside the shared directory.
pub const SNAPSHOT_FILE: &str = "save.dat";

/// Maximum number of quarantined snapshots to retain.
const MAX_CORRUPT_SNAPSHOTS: usize = 5;

const CORRUPT_PREFIX: &str = "save_corrupt_";
const CORRUPT_EXTENSION: &str = ".dat";

/// On-disk copy of the synchronized state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Protocol version of the writer.
    pub protocol_version: u32,

    /// When the snapshot was taken.
    pub saved_at: DateTime<Utc>,

    /// Values received from the peer.
    pub received: ColorParameterSet,

    /// Local editable values.
    pub local: ColorParameterSet,

    /// SHA-256 over `received` and `local`.
    pub checksum: String,
}

impl PersistedSnapshot {
    pub fn new(
        protocol_version: u32,
        received: ColorParameterSet,
        local: ColorParameterSet,
    ) -> Result<Self> {
        let checksum = content_checksum(&received, &local)?;
        Ok(Self {
            protocol_version,
            saved_at: Utc::now(),
            received,
            local,
            checksum,
        })
    }

    /// True when the stored checksum matches the content.
    pub fn verify(&self) -> bool {
        match content_checksum(&self.received, &self.local) {
            Ok(checksum) => self.checksum == checksum,
            Err(_) => false,
        }
    }
}

fn content_checksum(received: &ColorParameterSet, local: &ColorParameterSet) -> Result<String> {
    let mut hasher = Sha256::new();
    // BTreeMap serialization is ordered, so equal content hashes equally.
    hasher.update(serde_json::to_vec(received)?);
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(local)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Handle to the snapshot file of one directory.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create an empty snapshot file if none exists.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            storage::truncate(&self.path)?;
        }
        Ok(())
    }

    /// Serialize and atomically replace the snapshot.
    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        storage::write_atomic(&self.path, &bytes)
    }

    /// Load the snapshot.
    ///
    /// Returns `Ok(None)` when the file is missing or empty (first run).
    pub fn load(&self) -> Result<Option<PersistedSnapshot>> {
        if storage::is_empty_file(&self.path)? {
            return Ok(None);
        }

        let bytes = storage::read_bytes(&self.path)?;
        let snapshot: PersistedSnapshot = serde_json::from_slice(&bytes)?;
        if !snapshot.verify() {
            return Err(SyncError::ChecksumMismatch {
                path: self.path.clone(),
            });
        }
        Ok(Some(snapshot))
    }

    /// Startup load path: any failure is logged and treated as "no snapshot".
    ///
    /// A corrupt file is quarantined so the next save does not silently
    /// destroy it.
    pub fn load_or_quarantine(&self) -> Option<PersistedSnapshot> {
        match self.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable snapshot {}: {}",
                    self.path.display(),
                    e
                );
                match self.quarantine() {
                    Ok(Some(moved)) => {
                        log::warn!("Corrupt snapshot moved to {}", moved.display())
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Could not quarantine snapshot: {}", e),
                }
                None
            }
        }
    }

    /// Move the current snapshot aside, rotating old quarantined copies.
    ///
    /// Returns the new location, or `None` if there was nothing to move.
    pub fn quarantine(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let target = dir.join(format!("{}{}{}", CORRUPT_PREFIX, timestamp, CORRUPT_EXTENSION));

        fs::rename(&self.path, &target).map_err(|e| SyncError::FileWriteError {
            path: target.clone(),
            source: e,
        })?;

        rotate_corrupt(dir)?;
        Ok(Some(target))
    }
}

/// Quarantined snapshots in `dir`, newest first.
pub fn list_corrupt(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with(CORRUPT_PREFIX) && name.ends_with(CORRUPT_EXTENSION)
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    // Timestamped names sort chronologically.
    found.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    found
}

fn rotate_corrupt(dir: &Path) -> Result<()> {
    let mut found = list_corrupt(dir);
    while found.len() > MAX_CORRUPT_SNAPSHOTS {
        if let Some(oldest) = found.pop() {
            fs::remove_file(&oldest).map_err(|e| SyncError::FileWriteError {
                path: oldest,
                source: e,
            })?;
        }
    }
    Ok(())
}
