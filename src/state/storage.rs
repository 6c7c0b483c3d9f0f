//! File helpers for the parameter directory.
//!
//! Every file the protocol touches is either written whole (temp sibling then
//! rename) or truncated to zero length. Nothing is appended or edited in place.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Create `dir` and its parents if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| SyncError::DirectoryCreateError {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Length of `path` in bytes; a missing file has length zero.
pub fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(SyncError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// True when `path` is missing or zero-length.
pub fn is_empty_file(path: &Path) -> Result<bool> {
    Ok(file_len(path)? == 0)
}

/// Read the whole file.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| SyncError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Truncate `path` to zero length, creating it if missing.
pub fn truncate(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| SyncError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Replace `path` with `bytes` so that readers see either the old or the new
/// content, never a prefix of it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    let write_err = |e| SyncError::FileWriteError {
        path: tmp.clone(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)
        .map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| SyncError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
