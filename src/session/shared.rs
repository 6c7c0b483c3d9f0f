//! State shared between the UI thread and the sync worker.
//!
//! The store, the phase and the agreed directory live behind one mutex. The
//! worker holds the lock only for in-memory work; file and socket I/O happen
//! outside it.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::session::phase::{Role, SessionPhase};
use crate::store::ParameterStore;

#[derive(Debug)]
pub struct SessionState {
    pub store: ParameterStore,
    pub phase: SessionPhase,
    pub directory: Option<PathBuf>,
}

#[derive(Debug)]
pub struct SharedState {
    role: Role,
    inner: Mutex<SessionState>,
}

impl SharedState {
    pub fn new(role: Role, store: ParameterStore) -> Self {
        Self {
            role,
            inner: Mutex::new(SessionState {
                store,
                phase: SessionPhase::Initializing,
                directory: None,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Lock the session state.
    ///
    /// A panic while holding the lock cannot leave the map half-updated in a
    /// way that matters to the protocol, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase.clone()
    }

    /// Move to `next`, logging the transition. `Failed` is never left.
    pub fn transition(&self, next: SessionPhase) {
        let mut state = self.lock();
        if state.phase.is_terminal() || state.phase == next {
            return;
        }

        match &next {
            SessionPhase::Failed(reason) => log::error!(
                "{} session failed in {}: {}",
                self.role,
                state.phase.label(self.role),
                reason
            ),
            _ => log::info!(
                "{} session: {} -> {}",
                self.role,
                state.phase.label(self.role),
                next.label(self.role)
            ),
        }
        state.phase = next;
    }
}
