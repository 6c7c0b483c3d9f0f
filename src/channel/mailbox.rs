//! File Mailbox Channel
//!
//! Each direction is a single-slot file. Empty means free; non-empty means a
//! message is waiting. The consumer reads the message and truncates the file,
//! and that truncation is the only acknowledgment the producer gets.
//!
//! `send.dat` is written by the host and consumed by the editor;
//! `receive.dat` is the mirror. Roles never swap for the life of a directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::color::ColorParameterSet;
use crate::error::{Result, SyncError};
use crate::session::phase::Role;
use crate::state::storage;

/// Slot written by the host, read by the editor.
pub const SEND_FILE: &str = "send.dat";

/// Slot written by the editor, read by the host.
pub const RECEIVE_FILE: &str = "receive.dat";

/// Content of an occupied slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum MailboxMessage {
    /// Protocol version, exchanged once during the handshake.
    Version(u32),
    /// Parameter changes, exchanged in steady state.
    Parameters(ColorParameterSet),
}

/// One single-slot file.
#[derive(Debug, Clone)]
pub struct MailboxSlot {
    path: PathBuf,
}

impl MailboxSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a free slot.
    pub fn is_free(&self) -> Result<bool> {
        storage::is_empty_file(&self.path)
    }

    /// Write `message` into a free slot.
    ///
    /// Fails with `SlotOccupied` instead of overwriting an unconsumed message.
    pub fn post(&self, message: &MailboxMessage) -> Result<()> {
        if !self.is_free()? {
            return Err(SyncError::SlotOccupied {
                path: self.path.clone(),
            });
        }
        self.overwrite(message)
    }

    /// Write `message` regardless of the slot state.
    ///
    /// Only used while a side owns both ends of the directory, during
    /// bootstrap and the handshake version exchange.
    pub fn overwrite(&self, message: &MailboxMessage) -> Result<()> {
        let bytes = serde_json::to_vec(message)?;
        storage::write_atomic(&self.path, &bytes)
    }

    /// Parse the pending message without consuming it.
    pub fn peek(&self) -> Result<Option<MailboxMessage>> {
        if self.is_free()? {
            return Ok(None);
        }
        let bytes = storage::read_bytes(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Mark the slot free.
    pub fn acknowledge(&self) -> Result<()> {
        storage::truncate(&self.path)
    }

    /// Read the pending message and acknowledge it.
    ///
    /// The slot is truncated even when the content cannot be parsed, so a bad
    /// message cannot wedge the channel. The parse result is still returned.
    pub fn take(&self) -> Result<Option<MailboxMessage>> {
        if self.is_free()? {
            return Ok(None);
        }
        let parsed = storage::read_bytes(&self.path)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(SyncError::from));
        self.acknowledge()?;
        parsed.map(Some)
    }

    /// Consume a version message.
    pub fn take_version(&self) -> Result<Option<u32>> {
        match self.take()? {
            None => Ok(None),
            Some(MailboxMessage::Version(v)) => Ok(Some(v)),
            Some(MailboxMessage::Parameters(_)) => Err(SyncError::UnexpectedMessage {
                path: self.path.clone(),
                expected: "protocol version",
            }),
        }
    }
}

/// Stat-based change notification for one slot.
///
/// Reports a change whenever the slot's length or modification time differs
/// from the last observation. The first poll always reports a change.
/// Only a free slot is ever remembered as "seen", so a message posted while
/// the consumer is busy is still reported on the next poll.
#[derive(Debug)]
pub struct SlotWatcher {
    path: PathBuf,
    last_seen: Option<(u64, Option<SystemTime>)>,
}

impl SlotWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: None,
        }
    }

    fn observe(&self) -> (u64, Option<SystemTime>) {
        match std::fs::metadata(&self.path) {
            Ok(meta) => (meta.len(), meta.modified().ok()),
            Err(_) => (0, None),
        }
    }

    /// True if the slot changed since the last poll or `settle`.
    pub fn poll_changed(&mut self) -> bool {
        let current = self.observe();
        let changed = self.last_seen != Some(current);
        self.last_seen = Some(current);
        changed
    }

    /// Re-baseline after consuming: remember the slot only if it is free.
    pub fn settle(&mut self) {
        let current = self.observe();
        self.last_seen = if current.0 == 0 { Some(current) } else { None };
    }
}

/// Both slots of a shared directory, oriented for one role.
#[derive(Debug)]
pub struct Mailbox {
    pub outbound: MailboxSlot,
    pub inbound: MailboxSlot,
    watcher: SlotWatcher,
}

impl Mailbox {
    pub fn for_role(role: Role, dir: &Path) -> Self {
        let send = dir.join(SEND_FILE);
        let receive = dir.join(RECEIVE_FILE);
        let (outbound, inbound) = match role {
            Role::Host => (send, receive),
            Role::Editor => (receive, send),
        };
        Self {
            watcher: SlotWatcher::new(inbound.clone()),
            outbound: MailboxSlot::new(outbound),
            inbound: MailboxSlot::new(inbound),
        }
    }

    /// Consume an inbound parameter message if the watcher saw a change.
    ///
    /// `Ok(None)` covers both "no notification" and "notified but empty".
    /// A version message is returned but left in the slot: it belongs to the
    /// next handshake of a restarted peer.
    pub fn receive(&mut self) -> Result<Option<MailboxMessage>> {
        if !self.watcher.poll_changed() {
            return Ok(None);
        }
        let received = match self.inbound.peek() {
            Ok(Some(MailboxMessage::Version(v))) => Ok(Some(MailboxMessage::Version(v))),
            Ok(Some(message)) => self.inbound.acknowledge().map(|_| Some(message)),
            Ok(None) => Ok(None),
            Err(e) => {
                if let Err(ack) = self.inbound.acknowledge() {
                    log::warn!("Cannot clear {}: {}", self.inbound.path().display(), ack);
                }
                Err(e)
            }
        };
        self.watcher.settle();
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn params(name: &str, color: Color) -> MailboxMessage {
        let mut set = ColorParameterSet::new();
        set.insert(name.to_string(), color);
        MailboxMessage::Parameters(set)
    }

    #[test]
    fn test_post_take_cycle_keeps_slot_invariant() {
        let temp = tempdir().unwrap();
        let slot = MailboxSlot::new(temp.path().join(SEND_FILE));

        assert!(slot.is_free().unwrap());
        slot.post(&params("primary", Color::rgb(255, 0, 0))).unwrap();
        assert!(!slot.is_free().unwrap());

        let taken = slot.take().unwrap();
        assert_eq!(taken, Some(params("primary", Color::rgb(255, 0, 0))));
        assert!(slot.is_free().unwrap());
        assert_eq!(slot.take().unwrap(), None);
    }

    #[test]
    fn test_post_into_occupied_slot_fails() {
        let temp = tempdir().unwrap();
        let slot = MailboxSlot::new(temp.path().join(SEND_FILE));
        slot.post(&MailboxMessage::Version(1)).unwrap();

        let err = slot.post(&params("x", Color::rgb(0, 0, 0))).unwrap_err();
        assert!(matches!(err, SyncError::SlotOccupied { .. }));
        assert_eq!(slot.peek().unwrap(), Some(MailboxMessage::Version(1)));
    }

    #[test]
    fn test_take_truncates_unreadable_content() {
        let temp = tempdir().unwrap();
        let slot = MailboxSlot::new(temp.path().join(RECEIVE_FILE));
        std::fs::write(slot.path(), b"\x00garbage").unwrap();

        assert!(slot.take().is_err());
        assert!(slot.is_free().unwrap());
    }

    #[test]
    fn test_take_version_rejects_parameters() {
        let temp = tempdir().unwrap();
        let slot = MailboxSlot::new(temp.path().join(SEND_FILE));
        slot.post(&params("x", Color::rgb(1, 1, 1))).unwrap();

        assert!(matches!(
            slot.take_version(),
            Err(SyncError::UnexpectedMessage { .. })
        ));
        assert!(slot.is_free().unwrap());
    }

    #[test]
    fn test_roles_are_mirrored() {
        let temp = tempdir().unwrap();
        let host = Mailbox::for_role(Role::Host, temp.path());
        let editor = Mailbox::for_role(Role::Editor, temp.path());

        assert_eq!(host.outbound.path(), editor.inbound.path());
        assert_eq!(host.inbound.path(), editor.outbound.path());
        assert!(host.outbound.path().ends_with(SEND_FILE));
    }

    #[test]
    fn test_receive_only_on_change() {
        let temp = tempdir().unwrap();
        let mut host = Mailbox::for_role(Role::Host, temp.path());
        let mut editor = Mailbox::for_role(Role::Editor, temp.path());

        // First poll always looks; nothing is there yet.
        assert_eq!(editor.receive().unwrap(), None);
        assert_eq!(editor.receive().unwrap(), None);

        host.outbound
            .post(&params("primary", Color::rgb(255, 0, 0)))
            .unwrap();
        assert_eq!(
            editor.receive().unwrap(),
            Some(params("primary", Color::rgb(255, 0, 0)))
        );
        assert!(host.outbound.is_free().unwrap());
        assert_eq!(host.receive().unwrap(), None);
    }

    #[test]
    fn test_receive_leaves_version_for_handshake() {
        let temp = tempdir().unwrap();
        let host = Mailbox::for_role(Role::Host, temp.path());
        let mut editor = Mailbox::for_role(Role::Editor, temp.path());

        host.outbound.post(&MailboxMessage::Version(1)).unwrap();
        assert_eq!(editor.receive().unwrap(), Some(MailboxMessage::Version(1)));
        assert_eq!(editor.inbound.take_version().unwrap(), Some(1));
    }

    #[test]
    fn test_receive_clears_garbage() {
        let temp = tempdir().unwrap();
        let mut editor = Mailbox::for_role(Role::Editor, temp.path());
        std::fs::write(temp.path().join(SEND_FILE), b"not json").unwrap();

        assert!(editor.receive().is_err());
        assert!(editor.inbound.is_free().unwrap());
    }

    #[test]
    fn test_watcher_reports_occupied_slot_again_after_settle() {
        let temp = tempdir().unwrap();
        let slot = MailboxSlot::new(temp.path().join(SEND_FILE));
        let mut watcher = SlotWatcher::new(slot.path());

        slot.post(&MailboxMessage::Version(1)).unwrap();
        assert!(watcher.poll_changed());
        watcher.settle();
        assert!(watcher.poll_changed());

        slot.acknowledge().unwrap();
        watcher.settle();
        assert!(!watcher.poll_changed());
    }
}
