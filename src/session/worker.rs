//! Background sync worker.
//!
//! A single thread owns the session machine. Every `tick` wakes it for one
//! step; ticks that arrive while a step is running collapse into one.
//! Shutdown is observed before every step and the thread is joined.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{Result, SyncError};
use crate::session::machine::SessionMachine;

#[derive(Debug, Default)]
struct TickState {
    pending: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct TickSignal {
    state: Mutex<TickState>,
    cvar: Condvar,
}

impl TickSignal {
    fn notify(&self, apply: impl FnOnce(&mut TickState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        self.cvar.notify_one();
    }

    /// Block until a tick is pending. Returns false once shutdown is requested.
    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.shutdown {
                return false;
            }
            if state.pending {
                state.pending = false;
                return true;
            }
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Handle to the worker thread.
#[derive(Debug)]
pub struct SyncWorker {
    signal: Arc<TickSignal>,
    handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn spawn(mut machine: SessionMachine) -> Result<Self> {
        let signal = Arc::new(TickSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name(format!("paramsync-{}", machine.role()))
            .spawn(move || {
                while thread_signal.wait() {
                    machine.step();
                }
                machine.finish();
                log::debug!("{} sync worker stopped", machine.role());
            })
            .map_err(SyncError::WorkerSpawn)?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Request one step. Never blocks on the step itself.
    pub fn tick(&self) {
        self.signal.notify(|state| state.pending = true);
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.signal.notify(|state| state.shutdown = true);
        if handle.join().is_err() {
            log::error!("Sync worker panicked");
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
