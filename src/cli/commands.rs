//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::channel::{MailboxMessage, MailboxSlot, RECEIVE_FILE, SEND_FILE};
use crate::color::Color;
use crate::config::{StepMode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::session::SyncSession;
use crate::state::snapshot::list_corrupt;
use crate::state::version::read_marker;
use crate::state::{SnapshotFile, SNAPSHOT_FILE, VERSION_FILE};

/// Load the configuration file if given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            SyncConfig::from_file(path)
        }
        None => Ok(SyncConfig::default()),
    }
}

/// Run a headless editor session.
pub fn run_editor(
    mut config: SyncConfig,
    fps: u32,
    edits: &[(String, Color)],
    duration: Option<Duration>,
) -> Result<()> {
    config.step_mode = StepMode::Background;
    let session = SyncSession::editor(config)?;
    if let Some(addr) = session.rendezvous_addr() {
        println!("Editor listening on {}", addr);
    }

    let mut pushed = edits.is_empty();
    run_loop(&session, fps, duration, |session| {
        if !pushed && session.phase().is_synchronized() {
            for (name, color) in edits {
                session.set_color(name, *color);
                println!("Set {} = {}", name, color);
            }
            pushed = true;
        }
    });

    session.shutdown();
    Ok(())
}

/// Run a demo host session registering `params`.
pub fn run_host(
    mut config: SyncConfig,
    fps: u32,
    params: &[String],
    duration: Option<Duration>,
) -> Result<()> {
    config.step_mode = StepMode::Background;
    let session = SyncSession::host(config)?;
    if let Some(dir) = session.directory() {
        println!("Host directory: {}", dir.display());
    }

    for name in params {
        println!("Registered {} = {}", name, session.color(name));
    }

    run_loop(&session, fps, duration, |_| {});
    session.shutdown();
    Ok(())
}

/// Tick `session` at `fps` until `duration` elapses (forever if `None`),
/// printing phase changes and remote updates.
fn run_loop(
    session: &SyncSession,
    fps: u32,
    duration: Option<Duration>,
    mut on_frame: impl FnMut(&SyncSession),
) {
    let frame = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
    let started = Instant::now();
    let role = session.role();
    let mut last_phase = None;

    loop {
        session.tick();

        let phase = session.phase();
        if last_phase.as_ref() != Some(&phase) {
            match phase.failure() {
                Some(reason) => warn!("{} stopped synchronizing: {}", role, reason),
                None => println!("[{}] {}", role, phase.label(role)),
            }
            last_phase = Some(phase);
        }

        for name in session.take_updates() {
            println!("{} <- {} = {}", role, name, session.color(&name));
        }
        on_frame(session);

        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(frame);
    }
}

/// Print the state of a parameter directory.
pub fn inspect(dir: &Path) -> Result<()> {
    info!("Inspecting: {}", dir.display());

    match read_marker(dir) {
        Ok(Some(marker)) => println!(
            "Version marker: protocol {} (written {})",
            marker.protocol_version, marker.written_at
        ),
        Ok(None) => println!("Version marker: none"),
        Err(e) => println!("Version marker: unreadable ({})", e),
    }

    let snapshot = SnapshotFile::in_dir(dir);
    match snapshot.load() {
        Ok(Some(saved)) => {
            println!(
                "Snapshot: {} local, {} received (saved {}, protocol {})",
                saved.local.len(),
                saved.received.len(),
                saved.saved_at,
                saved.protocol_version
            );
            for (name, color) in &saved.local {
                println!("  {} = {}", name, color);
            }
        }
        Ok(None) if snapshot.exists() => println!("Snapshot: empty"),
        Ok(None) => println!("Snapshot: none"),
        Err(e) => println!("Snapshot: corrupt ({})", e),
    }

    for file in [SEND_FILE, RECEIVE_FILE] {
        let slot = MailboxSlot::new(dir.join(file));
        let state = match slot.peek() {
            Ok(None) => "free".to_string(),
            Ok(Some(MailboxMessage::Version(v))) => format!("version {}", v),
            Ok(Some(MailboxMessage::Parameters(set))) => format!("{} parameter(s)", set.len()),
            Err(e) => format!("unreadable ({})", e),
        };
        println!("{}: {}", file, state);
    }

    let corrupt = list_corrupt(dir);
    if !corrupt.is_empty() {
        println!("Quarantined snapshots:");
        for path in corrupt {
            println!("  {}", path.display());
        }
    }

    Ok(())
}

/// Clear the mailbox slots, and with `all` the marker and snapshot too.
pub fn reset(dir: &Path, all: bool) -> Result<()> {
    info!("Resetting: {}", dir.display());

    for file in [SEND_FILE, RECEIVE_FILE] {
        let slot = MailboxSlot::new(dir.join(file));
        if slot.path().exists() {
            slot.acknowledge()?;
            println!("Cleared {}", file);
        }
    }

    if all {
        for file in [VERSION_FILE, SNAPSHOT_FILE] {
            let path = dir.join(file);
            if remove_if_exists(&path)? {
                println!("Removed {}", file);
            }
        }
    }

    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path).map_err(|e| SyncError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::version::write_marker;
    use tempfile::tempdir;

    #[test]
    fn test_reset_clears_slots() {
        let temp = tempdir().unwrap();
        MailboxSlot::new(temp.path().join(SEND_FILE))
            .post(&MailboxMessage::Version(1))
            .unwrap();
        write_marker(temp.path(), 1).unwrap();

        reset(temp.path(), false).unwrap();
        assert!(MailboxSlot::new(temp.path().join(SEND_FILE))
            .is_free()
            .unwrap());
        assert!(temp.path().join(VERSION_FILE).exists());

        reset(temp.path(), true).unwrap();
        assert!(!temp.path().join(VERSION_FILE).exists());
    }

    #[test]
    fn test_inspect_tolerates_empty_directory() {
        let temp = tempdir().unwrap();
        inspect(temp.path()).unwrap();
    }

    #[test]
    fn test_load_config_defaults() {
        assert_eq!(load_config(None).unwrap(), SyncConfig::default());
    }
}
