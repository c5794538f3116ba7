//! Store-side rotation of mirrors kept current by other clients
mod common;

use common::MockRemote;
use rotasync::error::BackupError;
use rotasync::mirror::{MirrorOutcome, MirrorRotator, LAST_BACKUP, LAST_ROTATION};
use rotasync::types::MirrorRotation;
use std::path::PathBuf;
use tempfile::TempDir;

const SOURCE: &str = "/srv/share/family";

fn mirror() -> MirrorRotation {
	MirrorRotation {
		name: "family".to_string(),
		source: PathBuf::from(SOURCE),
		remote_root: PathBuf::from("/srv/history"),
		prefix: "v".to_string(),
		retain: 3,
	}
}

fn marker(name: &str) -> String {
	format!("{}/{}", SOURCE, name)
}

/// Store with one earlier snapshot and a fresh refresh of the source
fn refreshed_store() -> MockRemote {
	let remote = MockRemote::with_dirs(&["/srv/history/v.0", "/srv/share/family/photos"]);
	remote.write_file(&marker(LAST_BACKUP), "2026-10-18T02:00\n");
	remote.write_file(&marker(LAST_ROTATION), "2026-10-11T02:00\n");
	remote
}

#[tokio::test]
async fn test_equal_markers_skip_rotation() {
	let state = TempDir::new().unwrap();
	let remote = MockRemote::with_dirs(&["/srv/history/v.0", SOURCE]);
	remote.write_file(&marker(LAST_BACKUP), "2026-10-18T02:00\n");
	remote.write_file(&marker(LAST_ROTATION), "2026-10-18T02:00\n");

	let outcome = MirrorRotator::new(&remote, state.path()).run(&mirror()).await.unwrap();

	assert_eq!(outcome, MirrorOutcome::Unchanged);
	assert_eq!(remote.count("mv"), 0);
	assert_eq!(remote.count("rsync"), 0);
	assert_eq!(remote.count("cp"), 0);
	assert!(remote.has_dir("/srv/history/v.0"));
	assert!(!remote.has_dir("/srv/history/v.1"));
}

#[tokio::test]
async fn test_missing_markers_count_as_equal() {
	let state = TempDir::new().unwrap();
	let remote = MockRemote::with_dirs(&[SOURCE]);

	let outcome = MirrorRotator::new(&remote, state.path()).run(&mirror()).await.unwrap();

	assert_eq!(outcome, MirrorOutcome::Unchanged);
	// Both markers now exist, empty
	assert_eq!(remote.read_file(&marker(LAST_BACKUP)), Some(String::new()));
	assert_eq!(remote.read_file(&marker(LAST_ROTATION)), Some(String::new()));
}

#[tokio::test]
async fn test_changed_marker_creates_linked_generation() {
	let state = TempDir::new().unwrap();
	let remote = refreshed_store();
	let rotator = MirrorRotator::new(&remote, state.path());

	let outcome = rotator.run(&mirror()).await.unwrap();

	assert_eq!(outcome, MirrorOutcome::Rotated { reference: Some(PathBuf::from("/srv/history/v.1")) });
	assert!(remote.has_dir("/srv/history/v.1"));
	assert!(remote.has_dir("/srv/history/v.0/photos"));
	assert!(remote.violations().is_empty());

	let log = remote.log();
	let mv = log.iter().position(|l| l.starts_with("mv ")).unwrap();
	let rsync = log.iter().position(|l| l.starts_with("rsync ")).unwrap();
	let cp = log.iter().position(|l| l.starts_with("cp ")).unwrap();
	assert!(mv < rsync && rsync < cp, "{:?}", log);
	assert!(log[rsync].contains("--link-dest=../v.1 /srv/share/family/ /srv/history/v.0"));

	assert_eq!(remote.read_file(&marker(LAST_ROTATION)), remote.read_file(&marker(LAST_BACKUP)));
	assert!(!state.path().join("family.mirror.lock").exists());

	// Nothing new since the snapshot
	remote.clear_log();
	assert_eq!(rotator.run(&mirror()).await.unwrap(), MirrorOutcome::Unchanged);
	assert_eq!(remote.count("mv"), 0);
}

#[tokio::test]
async fn test_first_snapshot_has_no_reference() {
	let state = TempDir::new().unwrap();
	let remote = MockRemote::with_dirs(&[SOURCE]);
	remote.write_file(&marker(LAST_BACKUP), "first\n");

	let outcome = MirrorRotator::new(&remote, state.path()).run(&mirror()).await.unwrap();

	assert_eq!(outcome, MirrorOutcome::Rotated { reference: None });
	assert!(remote.has_dir("/srv/history/v.0"));
	assert!(remote.log().iter().all(|l| !l.contains("--link-dest")));
}

#[tokio::test]
async fn test_failed_snapshot_keeps_marker() {
	let state = TempDir::new().unwrap();
	let remote = refreshed_store();
	remote.fail_on("rsync");

	let result = MirrorRotator::new(&remote, state.path()).run(&mirror()).await;

	assert!(matches!(result, Err(BackupError::Transport(_))));
	assert_eq!(remote.count("cp"), 0);
	assert_eq!(remote.read_file(&marker(LAST_ROTATION)), Some("2026-10-11T02:00\n".to_string()));
}

#[tokio::test]
async fn test_failed_shift_reported_as_rotation_error() {
	let state = TempDir::new().unwrap();
	let remote = refreshed_store();
	remote.fail_on("mv");

	let result = MirrorRotator::new(&remote, state.path()).run(&mirror()).await;

	assert!(matches!(result, Err(BackupError::Rotation { ref group, .. }) if group == "family"));
	assert_eq!(remote.count("rsync"), 0);
}

// vim: ts=4
