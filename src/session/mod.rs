//! Sync Session
//!
//! `SyncSession` is what an application holds: a parameter store plus the
//! machinery that keeps it in step with the peer. Construction never fails
//! because the peer is missing or incompatible; such sessions end in
//! `SessionPhase::Failed` and keep working as a local store.
//!
//! # Example
//!
//! ```no_run
//! use paramsync::{SyncConfig, SyncSession};
//!
//! let session = SyncSession::host(SyncConfig::default()).unwrap();
//! loop {
//!     session.tick();
//!     let background = session.color("background");
//!     // render with `background`...
//! #   let _ = background;
//! #   break;
//! }
//! ```

pub mod bootstrap;
pub mod machine;
pub mod phase;
pub mod shared;
pub mod worker;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::color::{Color, ColorParameterSet};
use crate::config::{StepMode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::store::ParameterStore;

pub use machine::SessionMachine;
pub use phase::{FailureReason, Role, SessionPhase};
pub use shared::{SessionState, SharedState};
pub use worker::SyncWorker;

/// How steps get executed.
#[derive(Debug)]
enum Driver {
    Background(SyncWorker),
    Inline(Mutex<SessionMachine>),
    /// Terminal from the start; nothing left to drive.
    Idle,
}

/// One side of a synchronization session.
#[derive(Debug)]
pub struct SyncSession {
    shared: Arc<SharedState>,
    driver: Driver,
    rendezvous_addr: Option<SocketAddr>,
}

impl SyncSession {
    /// Start the host side: prepare `config.local_dir`, restore the last
    /// snapshot and begin connecting to the editor.
    pub fn host(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        if config.port == 0 {
            return Err(SyncError::InvalidConfig {
                reason: "host needs the editor's port; 0 is only valid for the editor"
                    .to_string(),
            });
        }
        let mode = config.step_mode;
        let shared = Arc::new(SharedState::new(Role::Host, ParameterStore::new()));
        let machine = SessionMachine::host(config, Arc::clone(&shared));
        Self::start(shared, machine, mode)
    }

    /// Start the editor side: listen for a host on `config.port`.
    pub fn editor(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.step_mode;
        let shared = Arc::new(SharedState::new(Role::Editor, ParameterStore::new()));
        let machine = SessionMachine::editor(config, Arc::clone(&shared));
        Self::start(shared, machine, mode)
    }

    fn start(shared: Arc<SharedState>, machine: SessionMachine, mode: StepMode) -> Result<Self> {
        let rendezvous_addr = machine.rendezvous_addr();
        let driver = if shared.phase().is_terminal() {
            Driver::Idle
        } else {
            match mode {
                StepMode::Background => Driver::Background(SyncWorker::spawn(machine)?),
                StepMode::Inline => Driver::Inline(Mutex::new(machine)),
            }
        };

        Ok(Self {
            shared,
            driver,
            rendezvous_addr,
        })
    }

    /// Advance the session by one step.
    ///
    /// In background mode this only wakes the worker; in inline mode the
    /// step runs before returning.
    pub fn tick(&self) {
        match &self.driver {
            Driver::Background(worker) => worker.tick(),
            Driver::Inline(machine) => {
                machine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .step();
            }
            Driver::Idle => {}
        }
    }

    /// Current value of `name`, created with a random color if unknown.
    pub fn color(&self, name: &str) -> Color {
        self.shared.lock().store.get_or_create(name)
    }

    /// Local edit, delivered to the peer on a later step.
    pub fn set_color(&self, name: &str, color: Color) {
        self.shared.lock().store.set(name, color);
    }

    /// Copy of every known parameter.
    pub fn colors(&self) -> ColorParameterSet {
        self.shared.lock().store.values().clone()
    }

    /// Names changed by the peer since the last call.
    pub fn take_updates(&self) -> Vec<String> {
        self.shared.lock().store.take_updates()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn role(&self) -> Role {
        self.shared.role()
    }

    /// Shared directory, once agreed (host: as soon as it is prepared).
    pub fn directory(&self) -> Option<PathBuf> {
        self.shared.lock().directory.clone()
    }

    /// Editor only: the address the rendezvous listener is bound to.
    pub fn rendezvous_addr(&self) -> Option<SocketAddr> {
        self.rendezvous_addr
    }

    /// Stop the worker and write a final snapshot.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        match std::mem::replace(&mut self.driver, Driver::Idle) {
            Driver::Background(mut worker) => worker.shutdown(),
            Driver::Inline(machine) => machine
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .finish(),
            Driver::Idle => {}
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.stop();
    }
}
