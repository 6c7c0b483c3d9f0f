//! Paramsync - live color parameter synchronization
//!
//! A running application (the host) and a tuning tool (the editor) share a
//! set of named colors. Either side may change a value; the change reaches the
//! other side within a few ticks and survives restarts.
//!
//! # Architecture
//!
//! - Rendezvous: the host connects to the editor's TCP port once and names a
//!   directory both processes can reach.
//! - Mailbox: from then on each direction is a single-slot file in that
//!   directory, consumed by truncation.
//! - Snapshot: the editor periodically persists the state to `save.dat`,
//!   which the host restores from on its next start.
//!
//! Applications hold a [`SyncSession`] and call [`SyncSession::tick`] once per
//! frame.

pub mod channel;
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod handshake;
pub mod session;
pub mod state;
pub mod store;

pub use color::{Color, ColorParameterSet};
pub use config::{StepMode, SyncConfig};
pub use error::{Result, SyncError};
pub use session::{FailureReason, Role, SessionPhase, SyncSession};
pub use store::ParameterStore;
