//! Synchronization state machine
//!
//! One machine drives either role. The handshake sub-steps differ by role;
//! the steady-state step is identical apart from which slot is inbound and
//! whether the snapshot is written.
//!
//! Host:   AwaitingPeer (connect, send directory) -> AwaitingDirectoryAck
//!         (wait until the editor clears `send.dat`, then check the editor's
//!         version in `receive.dat`) -> Synchronized.
//! Editor: AwaitingPeer (accept, read directory, publish own version, check
//!         and clear the host's version) -> AwaitingDirectoryAck (wait until
//!         the host clears `receive.dat`) -> Synchronized.
//!
//! Each `step` does at most one phase's worth of work and never blocks for
//! longer than the configured socket timeouts.

use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::channel::{Mailbox, MailboxMessage};
use crate::config::SyncConfig;
use crate::handshake::{DirectoryPayload, RendezvousConnector, RendezvousListener};
use crate::session::bootstrap::prepare_host_directory;
use crate::session::phase::{FailureReason, Role, SessionPhase};
use crate::session::shared::SharedState;
use crate::state::snapshot::{PersistedSnapshot, SnapshotFile};

/// Socket side of the session.
#[derive(Debug)]
enum Rendezvous {
    /// Editor: listener stays bound so a restarted host can reconnect.
    Listening {
        listener: RendezvousListener,
        connection: Option<TcpStream>,
    },
    /// Host: retries the connection every tick until the editor answers.
    Connecting {
        connector: RendezvousConnector,
        payload: DirectoryPayload,
    },
    Closed,
}

/// Per-process protocol driver.
#[derive(Debug)]
pub struct SessionMachine {
    role: Role,
    config: SyncConfig,
    shared: Arc<SharedState>,
    rendezvous: Rendezvous,
    mailbox: Option<Mailbox>,
    snapshot: Option<SnapshotFile>,
    last_snapshot: Instant,
}

impl SessionMachine {
    /// Bootstrap the host directory and prepare to connect.
    ///
    /// Bootstrap failures leave the session in `Failed`; they are not errors.
    pub fn host(config: SyncConfig, shared: Arc<SharedState>) -> Self {
        let mut machine = Self::bare(Role::Host, config, shared);

        let boot = match prepare_host_directory(&machine.config.local_dir, machine.version()) {
            Ok(boot) => boot,
            Err(e) => {
                machine.fail(FailureReason::DirectoryUnavailable {
                    detail: e.to_string(),
                });
                return machine;
            }
        };

        {
            let mut state = machine.shared.lock();
            if let Some(snapshot) = &boot.restored {
                let restored = state.store.restore(snapshot);
                log::info!(
                    "Restored {} parameter(s) from {}",
                    restored,
                    boot.directory.display()
                );
            }
            state.directory = Some(boot.directory.clone());
        }

        if !machine.config.enabled {
            machine.fail(FailureReason::SyncDisabled);
            return machine;
        }

        let payload = match DirectoryPayload::encode(&boot.directory) {
            Ok(payload) => payload,
            Err(e) => {
                machine.fail(FailureReason::DirectoryUnavailable {
                    detail: e.to_string(),
                });
                return machine;
            }
        };

        machine.mailbox = Some(Mailbox::for_role(Role::Host, &boot.directory));
        if !boot.phase.is_terminal() {
            machine.rendezvous = Rendezvous::Connecting {
                connector: RendezvousConnector::new(
                    machine.config.port,
                    machine.config.connect_timeout(),
                ),
                payload,
            };
        }
        machine.shared.transition(boot.phase);
        machine
    }

    /// Bind the rendezvous listener and wait for a host.
    pub fn editor(config: SyncConfig, shared: Arc<SharedState>) -> Self {
        let mut machine = Self::bare(Role::Editor, config, shared);

        if !machine.config.enabled {
            machine.fail(FailureReason::SyncDisabled);
            return machine;
        }

        match RendezvousListener::bind(machine.config.port, machine.config.handshake_read_timeout())
        {
            Ok(listener) => {
                if let Ok(addr) = listener.local_addr() {
                    log::info!("Editor listening for host on {}", addr);
                }
                machine.rendezvous = Rendezvous::Listening {
                    listener,
                    connection: None,
                };
                machine.shared.transition(SessionPhase::AwaitingPeer);
            }
            Err(e) => machine.fail(FailureReason::ListenerUnavailable {
                detail: e.to_string(),
            }),
        }
        machine
    }

    fn bare(role: Role, config: SyncConfig, shared: Arc<SharedState>) -> Self {
        Self {
            role,
            config,
            shared,
            rendezvous: Rendezvous::Closed,
            mailbox: None,
            snapshot: None,
            last_snapshot: Instant::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn version(&self) -> u32 {
        self.config.protocol_version
    }

    /// Address the editor is listening on.
    pub fn rendezvous_addr(&self) -> Option<SocketAddr> {
        match &self.rendezvous {
            Rendezvous::Listening { listener, .. } => listener.local_addr().ok(),
            _ => None,
        }
    }

    /// Run one protocol step and return the resulting phase.
    pub fn step(&mut self) -> SessionPhase {
        match (self.shared.phase(), self.role) {
            (SessionPhase::Initializing, _) | (SessionPhase::Failed(_), _) => {}
            (SessionPhase::AwaitingPeer, Role::Editor) => {
                self.poll_rendezvous();
            }
            (SessionPhase::AwaitingPeer, Role::Host) => self.propose_directory(),
            (SessionPhase::AwaitingDirectoryAck, Role::Editor) => self.await_host_ack(),
            (SessionPhase::AwaitingDirectoryAck, Role::Host) => self.await_editor_ack(),
            (SessionPhase::Synchronized, _) => self.exchange(),
        }
        self.shared.phase()
    }

    /// Clean shutdown point: persist the latest state once more.
    pub fn finish(&mut self) {
        if self.role.writes_snapshot() && self.shared.phase().is_synchronized() {
            self.save_snapshot();
        }
        self.close_rendezvous();
    }

    fn fail(&mut self, reason: FailureReason) {
        self.rendezvous = Rendezvous::Closed;
        self.shared.transition(SessionPhase::Failed(reason));
    }

    // Editor handshake

    /// Accept a host if one is connecting and start the handshake with it.
    ///
    /// Returns true when a host was adopted.
    fn poll_rendezvous(&mut self) -> bool {
        let accepted = match &self.rendezvous {
            Rendezvous::Listening { listener, .. } => listener.poll_accept(),
            _ => return false,
        };

        match accepted {
            Ok(Some((stream, dir))) => {
                if let Rendezvous::Listening { connection, .. } = &mut self.rendezvous {
                    *connection = Some(stream);
                }
                self.adopt_directory(dir);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("Rejected rendezvous attempt: {}", e);
                false
            }
        }
    }

    fn adopt_directory(&mut self, dir: PathBuf) {
        log::info!("Host proposed directory {}", dir.display());
        let mailbox = Mailbox::for_role(Role::Editor, &dir);

        if let Err(e) = mailbox
            .outbound
            .overwrite(&MailboxMessage::Version(self.version()))
        {
            log::warn!("Could not announce version in {}: {}", dir.display(), e);
            self.drop_connection();
            return;
        }

        // Clearing the host's slot is the acknowledgment, even on mismatch,
        // so the host reads our version and fails too.
        let next = match mailbox.inbound.take_version() {
            Ok(Some(peer)) if peer == self.version() => SessionPhase::AwaitingDirectoryAck,
            Ok(Some(peer)) => SessionPhase::Failed(FailureReason::VersionMismatch {
                local: self.version(),
                peer,
            }),
            Ok(None) => SessionPhase::Failed(FailureReason::MissingPeerVersion),
            Err(e) => {
                log::warn!("Unreadable host version: {}", e);
                SessionPhase::Failed(FailureReason::MissingPeerVersion)
            }
        };

        if let SessionPhase::Failed(reason) = next {
            self.fail(reason);
            return;
        }

        let snapshot = SnapshotFile::in_dir(&dir);
        {
            let mut state = self.shared.lock();
            if let Some(saved) = snapshot.load_or_quarantine() {
                let restored = state.store.restore(&saved);
                log::info!("Restored {} parameter(s) from snapshot", restored);
            }
            state.directory = Some(dir);
        }

        self.mailbox = Some(mailbox);
        self.snapshot = Some(snapshot);
        self.shared.transition(next);
    }

    fn await_host_ack(&mut self) {
        let Some(mailbox) = &self.mailbox else {
            return;
        };

        match mailbox.outbound.is_free() {
            Ok(true) => {
                self.drop_connection();
                self.last_snapshot = Instant::now();
                self.shared.transition(SessionPhase::Synchronized);
            }
            Ok(false) => {
                // A host that restarted mid-handshake connects again.
                self.poll_rendezvous();
            }
            Err(e) => log::warn!("Cannot check handshake slot: {}", e),
        }
    }

    fn drop_connection(&mut self) {
        if let Rendezvous::Listening { connection, .. } = &mut self.rendezvous {
            *connection = None;
        }
    }

    // Host handshake

    fn propose_directory(&mut self) {
        let Rendezvous::Connecting { connector, payload } = &mut self.rendezvous else {
            return;
        };

        match connector.try_propose(payload) {
            Ok(()) => {
                log::info!("Connected to editor at {}", connector.addr());
                self.shared.transition(SessionPhase::AwaitingDirectoryAck);
            }
            Err(e) => log::debug!("Editor not reachable at {}: {}", connector.addr(), e),
        }
    }

    fn await_editor_ack(&mut self) {
        let Some(mailbox) = &self.mailbox else {
            return;
        };

        match mailbox.outbound.is_free() {
            Ok(true) => {
                let next = match mailbox.inbound.take_version() {
                    Ok(Some(peer)) if peer == self.version() => SessionPhase::Synchronized,
                    Ok(Some(peer)) => SessionPhase::Failed(FailureReason::VersionMismatch {
                        local: self.version(),
                        peer,
                    }),
                    Ok(None) => SessionPhase::Failed(FailureReason::MissingPeerVersion),
                    Err(e) => {
                        log::warn!("Unreadable editor version: {}", e);
                        SessionPhase::Failed(FailureReason::MissingPeerVersion)
                    }
                };
                self.close_rendezvous();
                self.shared.transition(next);
            }
            Ok(false) => {
                let lost = matches!(
                    &self.rendezvous,
                    Rendezvous::Connecting { connector, .. } if connector.peer_closed()
                );
                if lost {
                    self.restart_handshake();
                }
            }
            Err(e) => log::warn!("Cannot check handshake slot: {}", e),
        }
    }

    /// The editor went away before acknowledging: reconnect from scratch.
    fn restart_handshake(&mut self) {
        log::warn!("Editor dropped the connection mid-handshake; reconnecting");
        if let Rendezvous::Connecting { connector, .. } = &mut self.rendezvous {
            connector.close();
        }

        if let Some(mailbox) = &self.mailbox {
            let announced = match mailbox.outbound.is_free() {
                Ok(true) => mailbox
                    .outbound
                    .overwrite(&MailboxMessage::Version(self.version())),
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = announced.and_then(|_| mailbox.inbound.acknowledge()) {
                log::warn!("Cannot reset handshake slots: {}", e);
            }
        }
        self.shared.transition(SessionPhase::AwaitingPeer);
    }

    fn close_rendezvous(&mut self) {
        match &mut self.rendezvous {
            Rendezvous::Connecting { connector, .. } => connector.close(),
            Rendezvous::Listening { connection, .. } => *connection = None,
            Rendezvous::Closed => {}
        }
        if self.role == Role::Host {
            self.rendezvous = Rendezvous::Closed;
        }
    }

    // Steady state

    fn exchange(&mut self) {
        if self.role == Role::Editor && self.poll_rendezvous() {
            return;
        }

        let peer = self.role.peer();
        let Some(mailbox) = self.mailbox.as_mut() else {
            return;
        };

        match mailbox.receive() {
            Ok(Some(MailboxMessage::Parameters(set))) => {
                log::debug!("Received {} parameter(s) from {}", set.len(), peer);
                self.shared.lock().store.apply_remote_updates(set);
            }
            Ok(Some(MailboxMessage::Version(v))) => {
                log::debug!("{} restarted with version {}; waiting for rendezvous", peer, v);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Dropped unreadable message from {}: {}", peer, e),
        }

        match mailbox.outbound.is_free() {
            Ok(true) => {
                let pending = {
                    let mut state = self.shared.lock();
                    if state.store.has_pending() {
                        Some(state.store.drain_outbox())
                    } else {
                        None
                    }
                };
                if let Some(set) = pending {
                    let count = set.len();
                    match mailbox.outbound.post(&MailboxMessage::Parameters(set)) {
                        Ok(()) => log::debug!("Sent {} parameter(s) to {}", count, peer),
                        Err(e) => log::warn!("Dropped {} outgoing parameter(s): {}", count, e),
                    }
                }
            }
            Ok(false) => {}
            Err(e) => log::warn!("Cannot check outbound slot: {}", e),
        }

        if self.role.writes_snapshot()
            && self.last_snapshot.elapsed() >= self.config.snapshot_interval()
        {
            self.last_snapshot = Instant::now();
            self.save_snapshot();
        }
    }

    fn save_snapshot(&self) {
        let Some(file) = &self.snapshot else {
            return;
        };

        let snapshot = {
            let state = self.shared.lock();
            PersistedSnapshot::new(
                self.version(),
                state.store.received().clone(),
                state.store.values().clone(),
            )
        };

        match snapshot.and_then(|snapshot| file.save(&snapshot)) {
            Ok(()) => log::debug!("Snapshot saved to {}", file.path().display()),
            Err(e) => log::warn!("Snapshot save failed: {}", e),
        }
    }
}
