//! Integration Tests
//!
//! End-to-end sessions over real localhost TCP and a temporary directory.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use paramsync::channel::{MailboxSlot, SEND_FILE};
use paramsync::state::{SnapshotFile, SNAPSHOT_FILE};
use paramsync::{Color, FailureReason, SessionPhase, StepMode, SyncConfig, SyncSession};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};

const RED: Color = Color::rgb(255, 0, 0);
const TEAL: Color = Color::rgb(0, 128, 128);

/// Temporary host directory plus an editor config bound to an OS-chosen port.
struct Fixture {
    _temp: TempDir,
    host_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempdir().unwrap();
        let host_dir = temp.path().join("ParameterEditor");
        Self {
            _temp: temp,
            host_dir,
        }
    }

    fn editor(&self, version: u32) -> SyncSession {
        SyncSession::editor(fast_snapshots(editor_config(0, version))).unwrap()
    }

    fn editor_on(&self, port: u16, version: u32) -> SyncSession {
        SyncSession::editor(fast_snapshots(editor_config(port, version))).unwrap()
    }

    fn host(&self, editor: &SyncSession, version: u32) -> SyncSession {
        let port = editor.rendezvous_addr().unwrap().port();
        let config = SyncConfig::default()
            .with_port(port)
            .with_local_dir(&self.host_dir)
            .with_protocol_version(version)
            .with_step_mode(StepMode::Inline);
        SyncSession::host(config).unwrap()
    }
}

fn editor_config(port: u16, version: u32) -> SyncConfig {
    SyncConfig::default()
        .with_port(port)
        .with_protocol_version(version)
        .with_step_mode(StepMode::Inline)
}

fn fast_snapshots(mut config: SyncConfig) -> SyncConfig {
    config.snapshot_interval_ms = 1;
    config
}

/// Tick both sides until `done` holds or the tick budget runs out.
fn pump_until(
    host: &SyncSession,
    editor: &SyncSession,
    max_ticks: usize,
    mut done: impl FnMut(&SyncSession, &SyncSession) -> bool,
) -> bool {
    for _ in 0..max_ticks {
        if done(host, editor) {
            return true;
        }
        host.tick();
        editor.tick();
        thread::sleep(Duration::from_millis(2));
    }
    done(host, editor)
}

fn both_running(host: &SyncSession, editor: &SyncSession) -> bool {
    host.phase().is_synchronized() && editor.phase().is_synchronized()
}

fn connect(fixture: &Fixture) -> (SyncSession, SyncSession) {
    let editor = fixture.editor(1);
    let host = fixture.host(&editor, 1);
    assert!(pump_until(&host, &editor, 500, both_running));
    (host, editor)
}

fn slot_is_free(dir: &Path, file: &str) -> bool {
    MailboxSlot::new(dir.join(file)).is_free().unwrap()
}

// === Handshake ===

#[test]
fn test_editor_waits_without_host() {
    let fixture = Fixture::new();
    let editor = fixture.editor(1);

    for _ in 0..50 {
        editor.tick();
        assert_eq!(editor.phase(), SessionPhase::AwaitingPeer);
    }
    assert_eq!(editor.phase().label(editor.role()), "Ready");
    assert!(editor.directory().is_none());
}

#[test]
fn test_matching_versions_reach_running() {
    let fixture = Fixture::new();
    let editor = fixture.editor(1);
    let host = fixture.host(&editor, 1);

    let mut phases = Vec::new();
    let reached = pump_until(&host, &editor, 500, |host, editor| {
        phases.push((host.phase(), editor.phase()));
        both_running(host, editor)
    });

    assert!(reached);
    assert!(phases
        .iter()
        .all(|(h, e)| !h.is_terminal() && !e.is_terminal()));
    assert_eq!(host.directory(), editor.directory());
    assert_eq!(host.phase().label(host.role()), "Running");
}

#[test]
fn test_version_mismatch_fails_both_sides() {
    let fixture = Fixture::new();
    let editor = fixture.editor(2);
    let host = fixture.host(&editor, 1);

    let failed = pump_until(&host, &editor, 500, |host, editor| {
        host.phase().is_terminal() && editor.phase().is_terminal()
    });
    assert!(failed);
    assert_eq!(
        host.phase(),
        SessionPhase::Failed(FailureReason::VersionMismatch { local: 1, peer: 2 })
    );
    assert_eq!(
        editor.phase(),
        SessionPhase::Failed(FailureReason::VersionMismatch { local: 2, peer: 1 })
    );
    assert_eq!(host.phase().label(host.role()), "Beginning");
    assert_eq!(editor.phase().label(editor.role()), "Error");

    host.set_color("primary", RED);
    editor.set_color("accent", TEAL);
    for _ in 0..10 {
        host.tick();
        editor.tick();
    }
    assert!(slot_is_free(&fixture.host_dir, SEND_FILE));
    assert!(editor.colors().get("primary").is_none());
    assert!(host.colors().get("accent").is_none());
}

#[test]
fn test_host_reconnects_after_editor_dies_mid_handshake() {
    let fixture = Fixture::new();
    let editor = fixture.editor(1);
    let port = editor.rendezvous_addr().unwrap().port();
    let host = fixture.host(&editor, 1);

    host.tick();
    assert_eq!(host.phase(), SessionPhase::AwaitingDirectoryAck);
    drop(editor);

    let editor = fixture.editor_on(port, 1);
    assert!(pump_until(&host, &editor, 500, both_running));

    host.set_color("primary", RED);
    assert!(pump_until(&host, &editor, 50, |_, editor| {
        editor.colors().get("primary") == Some(&RED)
    }));
}

#[test]
fn test_marker_mismatch_fails_host_before_connecting() {
    let fixture = Fixture::new();
    {
        let editor = fixture.editor(1);
        let _host = fixture.host(&editor, 1);
    }

    let editor = fixture.editor(2);
    let host = fixture.host(&editor, 2);
    assert_eq!(
        host.phase(),
        SessionPhase::Failed(FailureReason::VersionMismatch { local: 2, peer: 1 })
    );
    for _ in 0..20 {
        host.tick();
        editor.tick();
    }
    assert_eq!(editor.phase(), SessionPhase::AwaitingPeer);
}

// === Steady state ===

#[test]
fn test_host_edit_reaches_editor() {
    let fixture = Fixture::new();
    let (host, editor) = connect(&fixture);

    host.set_color("primary", RED);
    host.tick();
    editor.tick();

    assert_eq!(editor.colors().get("primary"), Some(&RED));
    assert_eq!(editor.take_updates(), vec!["primary".to_string()]);
    assert!(slot_is_free(&fixture.host_dir, SEND_FILE));
}

#[test]
fn test_editor_edit_reaches_host() {
    let fixture = Fixture::new();
    let (host, editor) = connect(&fixture);

    editor.set_color("accent", TEAL);
    assert!(pump_until(&host, &editor, 50, |host, _| {
        host.colors().get("accent") == Some(&TEAL)
    }));
    assert_eq!(host.take_updates(), vec!["accent".to_string()]);
    assert!(host.take_updates().is_empty());
}

#[test]
fn test_host_created_parameter_is_sent() {
    let fixture = Fixture::new();
    let (host, editor) = connect(&fixture);

    let created = host.color("background");
    assert!(pump_until(&host, &editor, 50, |_, editor| {
        editor.colors().get("background") == Some(&created)
    }));
}

#[test]
fn test_later_edit_wins() {
    let fixture = Fixture::new();
    let (host, editor) = connect(&fixture);

    host.set_color("primary", RED);
    host.set_color("primary", TEAL);
    assert!(pump_until(&host, &editor, 50, |_, editor| {
        editor.colors().get("primary") == Some(&TEAL)
    }));
}

// === Persistence ===

#[test]
fn test_snapshot_restores_editor_values_on_host_restart() {
    let fixture = Fixture::new();
    {
        let (host, editor) = connect(&fixture);
        editor.set_color("accent", TEAL);
        assert!(pump_until(&host, &editor, 50, |host, _| {
            host.colors().get("accent") == Some(&TEAL)
        }));
        editor.shutdown();
        host.shutdown();
    }

    let saved = SnapshotFile::in_dir(&fixture.host_dir)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(saved.local.get("accent"), Some(&TEAL));
    assert!(saved.verify());

    let editor = fixture.editor(1);
    let host = fixture.host(&editor, 1);
    assert_eq!(host.colors().get("accent"), Some(&TEAL));
}

#[test]
fn test_editor_saves_snapshot_on_interval() {
    let fixture = Fixture::new();
    let mut config = editor_config(0, 1);
    config.snapshot_interval_ms = 400;
    let editor = SyncSession::editor(config).unwrap();
    let host = fixture.host(&editor, 1);
    assert!(pump_until(&host, &editor, 100, both_running));

    let snapshot = SnapshotFile::in_dir(&fixture.host_dir);
    editor.set_color("accent", TEAL);
    editor.tick();
    assert!(snapshot.load().unwrap().is_none());

    thread::sleep(Duration::from_millis(500));
    editor.tick();
    let saved = snapshot.load().unwrap().unwrap();
    assert_eq!(saved.local.get("accent"), Some(&TEAL));
    assert!(editor.phase().is_synchronized());
}

#[test]
fn test_corrupt_snapshot_is_treated_as_absent() {
    let fixture = Fixture::new();
    {
        let editor = fixture.editor(1);
        let _host = fixture.host(&editor, 1);
    }
    std::fs::write(fixture.host_dir.join(SNAPSHOT_FILE), b"{ truncated").unwrap();

    let editor = fixture.editor(1);
    let host = fixture.host(&editor, 1);
    assert!(host.colors().is_empty());
    assert!(pump_until(&host, &editor, 500, both_running));
}

#[test]
fn test_editor_accepts_restarted_host() {
    let fixture = Fixture::new();
    let editor = fixture.editor(1);
    {
        let host = fixture.host(&editor, 1);
        assert!(pump_until(&host, &editor, 500, both_running));
    }

    let host = fixture.host(&editor, 1);
    assert!(pump_until(&host, &editor, 500, both_running));

    host.set_color("primary", RED);
    assert!(pump_until(&host, &editor, 50, |_, editor| {
        editor.colors().get("primary") == Some(&RED)
    }));
}

// === Background worker ===

#[test]
fn test_background_sessions_synchronize() {
    let fixture = Fixture::new();
    let editor = SyncSession::editor(SyncConfig::default().with_port(0)).unwrap();
    let port = editor.rendezvous_addr().unwrap().port();
    let host = SyncSession::host(
        SyncConfig::default()
            .with_port(port)
            .with_local_dir(&fixture.host_dir),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut delivered = false;
    while Instant::now() < deadline {
        host.tick();
        editor.tick();
        if both_running(&host, &editor) {
            editor.set_color("primary", RED);
        }
        if host.colors().get("primary") == Some(&RED) {
            delivered = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!(delivered);
    host.shutdown();
    editor.shutdown();
}
