//! Persistent State Module
//!
//! Snapshot persistence, the protocol version marker, and the file helpers
//! both are built on.

pub mod snapshot;
pub mod storage;
pub mod version;

pub use snapshot::{PersistedSnapshot, SnapshotFile, SNAPSHOT_FILE};
pub use version::{check_marker, MarkerCheck, VersionMarker, PROTOCOL_VERSION, VERSION_FILE};
