//! Color Parameter Store
//!
//! Keyed name -> color map shared between the UI layer and the sync worker.
//! Local changes accumulate in an outbox until the worker drains them into
//! the outbound mailbox; values received from the peer are applied
//! last-writer-wins and recorded so the UI can redraw.
//!
//! The store itself does no locking. The session wraps it, together with the
//! session phase, behind a single mutex.

use crate::color::{Color, ColorParameterSet};
use crate::state::snapshot::PersistedSnapshot;

/// Named color parameters plus the pending-outbound buffer.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    /// Current value of every known parameter.
    values: ColorParameterSet,
    /// Every value ever received from the peer, latest per key.
    received: ColorParameterSet,
    /// Local changes not yet transmitted.
    outbox: ColorParameterSet,
    /// Keys updated by the peer since the last `take_updates`, in receipt order.
    updates: Vec<String>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`, if it exists.
    pub fn get(&self, name: &str) -> Option<Color> {
        self.values.get(name).copied()
    }

    /// Returns the value of `name`, creating it with a random color if absent.
    ///
    /// A newly created parameter is queued for the peer.
    pub fn get_or_create(&mut self, name: &str) -> Color {
        if let Some(color) = self.values.get(name) {
            return *color;
        }

        let color = Color::random();
        self.values.insert(name.to_string(), color);
        self.outbox.insert(name.to_string(), color);
        color
    }

    /// Local edit: replaces the value and queues it for the peer.
    pub fn set(&mut self, name: &str, color: Color) {
        self.values.insert(name.to_string(), color);
        self.outbox.insert(name.to_string(), color);
    }

    /// Merges values received from the peer, last writer wins per key.
    ///
    /// Remote values never enter the outbox.
    pub fn apply_remote_updates(&mut self, set: ColorParameterSet) {
        for (name, color) in set {
            if !self.updates.contains(&name) {
                self.updates.push(name.clone());
            }
            self.received.insert(name.clone(), color);
            self.values.insert(name, color);
        }
    }

    /// Returns and clears the pending local changes.
    pub fn drain_outbox(&mut self) -> ColorParameterSet {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Keys changed by the peer since the previous call.
    pub fn take_updates(&mut self) -> Vec<String> {
        std::mem::take(&mut self.updates)
    }

    pub fn values(&self) -> &ColorParameterSet {
        &self.values
    }

    pub fn received(&self) -> &ColorParameterSet {
        &self.received
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fills in parameters from a persisted snapshot.
    ///
    /// Keys that already hold a live value keep it. Restored values are not
    /// queued for the peer. Returns the number of keys restored.
    pub fn restore(&mut self, snapshot: &PersistedSnapshot) -> usize {
        for (name, color) in &snapshot.received {
            self.received.entry(name.clone()).or_insert(*color);
        }

        let mut restored = 0;
        for (name, color) in &snapshot.local {
            if !self.values.contains_key(name) {
                self.values.insert(name.clone(), *color);
                restored += 1;
            }
        }
        restored
    }
}
