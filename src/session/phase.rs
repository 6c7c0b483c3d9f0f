//! Session roles and phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the protocol a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The running application consuming parameters; connects to the editor.
    Host,
    /// The tuning tool; listens for the host.
    Editor,
}

impl Role {
    /// Only the editor writes `save.dat`; the host reads it at startup.
    pub fn writes_snapshot(self) -> bool {
        matches!(self, Role::Editor)
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Host => Role::Editor,
            Role::Editor => Role::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Editor => write!(f, "editor"),
        }
    }
}

/// Why a session ended up in its terminal phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The peer, or a persisted marker, carries a different protocol version.
    VersionMismatch { local: u32, peer: u32 },
    /// A snapshot exists but no version marker says who wrote it.
    UnversionedSnapshot,
    /// The handshake slot that should hold the peer's version was empty.
    MissingPeerVersion,
    /// The rendezvous port could not be bound.
    ListenerUnavailable { detail: String },
    /// The host directory could not be prepared.
    DirectoryUnavailable { detail: String },
    /// Synchronization was switched off in the configuration.
    SyncDisabled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::VersionMismatch { local, peer } => {
                write!(f, "protocol version mismatch (local {}, peer {})", local, peer)
            }
            FailureReason::UnversionedSnapshot => {
                write!(f, "snapshot found without a version marker")
            }
            FailureReason::MissingPeerVersion => write!(f, "peer did not announce its version"),
            FailureReason::ListenerUnavailable { detail } => {
                write!(f, "cannot listen for the host: {}", detail)
            }
            FailureReason::DirectoryUnavailable { detail } => {
                write!(f, "cannot prepare the parameter directory: {}", detail)
            }
            FailureReason::SyncDisabled => write!(f, "synchronization disabled"),
        }
    }
}

/// Progress of one side through the protocol.
///
/// Names are shared by both roles; `label` gives the per-role state names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Constructed, bootstrap not finished.
    Initializing,
    /// Editor listening / host connecting.
    AwaitingPeer,
    /// Directory agreed, waiting for the peer to clear its version slot.
    AwaitingDirectoryAck,
    /// Steady-state mailbox exchange.
    Synchronized,
    /// Terminal; no transition leaves this phase.
    Failed(FailureReason),
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Failed(_))
    }

    pub fn is_synchronized(&self) -> bool {
        matches!(self, SessionPhase::Synchronized)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            SessionPhase::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Role-specific state name shown to the operator.
    pub fn label(&self, role: Role) -> &'static str {
        match (role, self) {
            (Role::Editor, SessionPhase::Initializing) => "Initializing",
            (Role::Editor, SessionPhase::AwaitingPeer) => "Ready",
            (Role::Editor, SessionPhase::AwaitingDirectoryAck) => "WaitingClient",
            (Role::Editor, SessionPhase::Synchronized) => "Running",
            (Role::Editor, SessionPhase::Failed(_)) => "Error",
            (Role::Host, SessionPhase::Initializing) => "Beginning",
            (Role::Host, SessionPhase::AwaitingPeer) => "Ready",
            (Role::Host, SessionPhase::AwaitingDirectoryAck) => "WaitingServer",
            (Role::Host, SessionPhase::Synchronized) => "Running",
            (Role::Host, SessionPhase::Failed(_)) => "Beginning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Role::Editor, SessionPhase::AwaitingPeer, "Ready")]
    #[test_case(Role::Editor, SessionPhase::AwaitingDirectoryAck, "WaitingClient")]
    #[test_case(Role::Editor, SessionPhase::Failed(FailureReason::MissingPeerVersion), "Error")]
    #[test_case(Role::Host, SessionPhase::AwaitingDirectoryAck, "WaitingServer")]
    #[test_case(Role::Host, SessionPhase::Failed(FailureReason::SyncDisabled), "Beginning")]
    #[test_case(Role::Host, SessionPhase::Synchronized, "Running")]
    fn test_labels(role: Role, phase: SessionPhase, expected: &str) {
        assert_eq!(phase.label(role), expected);
    }

    #[test]
    fn test_only_failed_is_terminal() {
        assert!(SessionPhase::Failed(FailureReason::UnversionedSnapshot).is_terminal());
        assert!(!SessionPhase::Synchronized.is_terminal());
        assert!(!SessionPhase::AwaitingPeer.is_terminal());
    }

    #[test]
    fn test_mismatch_display() {
        let reason = FailureReason::VersionMismatch { local: 2, peer: 1 };
        assert_eq!(
            reason.to_string(),
            "protocol version mismatch (local 2, peer 1)"
        );
    }

    #[test]
    fn test_snapshot_writer() {
        assert!(Role::Editor.writes_snapshot());
        assert!(!Role::Host.writes_snapshot());
        assert_eq!(Role::Host.peer(), Role::Editor);
    }
}
