//! Host directory bootstrap.
//!
//! Runs once, before the worker exists. Prepares the host's persistent
//! directory for a session: checks the version marker, restores the last
//! snapshot, announces the compiled version in the outbound slot and clears
//! the inbound slot.

use std::path::{Path, PathBuf};

use crate::channel::{Mailbox, MailboxMessage};
use crate::error::Result;
use crate::session::phase::{FailureReason, Role, SessionPhase};
use crate::state::snapshot::{PersistedSnapshot, SnapshotFile};
use crate::state::storage;
use crate::state::version::{check_marker, MarkerCheck};

/// Result of preparing the host directory.
#[derive(Debug)]
pub struct HostBootstrap {
    /// Absolute path proposed to the editor.
    pub directory: PathBuf,
    /// `AwaitingPeer` or a terminal failure.
    pub phase: SessionPhase,
    /// Snapshot to seed the store from.
    pub restored: Option<PersistedSnapshot>,
}

/// Prepare `local_dir` for a host session speaking `version`.
pub fn prepare_host_directory(local_dir: &Path, version: u32) -> Result<HostBootstrap> {
    storage::ensure_dir(local_dir)?;
    let directory = local_dir.canonicalize()?;
    let snapshot = SnapshotFile::in_dir(&directory);

    let mut restored = None;
    let phase = match check_marker(&directory, version)? {
        MarkerCheck::Matches => {
            restored = snapshot.load_or_quarantine();
            snapshot.ensure_exists()?;
            SessionPhase::AwaitingPeer
        }
        MarkerCheck::Mismatch { found } => SessionPhase::Failed(FailureReason::VersionMismatch {
            local: version,
            peer: found,
        }),
        MarkerCheck::Created if snapshot.exists() => {
            SessionPhase::Failed(FailureReason::UnversionedSnapshot)
        }
        MarkerCheck::Created => {
            snapshot.ensure_exists()?;
            SessionPhase::AwaitingPeer
        }
    };

    // Written even when failing, so an editor that still connects learns
    // which version this host speaks.
    let mailbox = Mailbox::for_role(Role::Host, &directory);
    mailbox.outbound.overwrite(&MailboxMessage::Version(version))?;
    mailbox.inbound.acknowledge()?;

    Ok(HostBootstrap {
        directory,
        phase,
        restored,
    })
}
