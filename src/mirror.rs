//! Generations of a copy that another client keeps current on the store
//!
//! The client refreshes `<source>` and rewrites the `LAST_BACKUP` marker when
//! it finishes. A rotation runs entirely on the store: it shifts the
//! generations, snapshots `<source>` into slot 0 with a local rsync linked
//! against slot 1, then copies `LAST_BACKUP` over `LAST_ROTATION`. Equal
//! markers mean nothing changed since the last snapshot.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::BackupError;
use crate::remote::{RemoteCommand, RemoteExecutor};
use crate::rotation::RotationManager;
use crate::types::MirrorRotation;
use crate::utils::{relative_path, RunLock};

/// Rewritten by the client after each completed refresh of the source
pub const LAST_BACKUP: &str = "rotasync_lastbackup.txt";

/// Copy of [`LAST_BACKUP`] taken when the last snapshot finished
pub const LAST_ROTATION: &str = "rotasync_lastrotation.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
	/// Markers matched, no generation was created
	Unchanged,
	/// A new slot 0 was created, linked against `reference` if set
	Rotated { reference: Option<PathBuf> },
}

pub struct MirrorRotator<'a, E: RemoteExecutor> {
	executor: &'a E,
	state_dir: &'a Path,
}

impl<'a, E: RemoteExecutor> MirrorRotator<'a, E> {
	pub fn new(executor: &'a E, state_dir: &'a Path) -> Self {
		MirrorRotator { executor, state_dir }
	}

	pub async fn run(&self, mirror: &MirrorRotation) -> Result<MirrorOutcome, BackupError> {
		let _lock = RunLock::acquire(self.state_dir, &format!("{}.mirror", mirror.name)).await?;
		info!("Process mirror {}", mirror.name);

		let last_backup = mirror.source.join(LAST_BACKUP);
		let last_rotation = mirror.source.join(LAST_ROTATION);
		if self.read_marker(&last_backup).await? == self.read_marker(&last_rotation).await? {
			info!("No new backup of {}, nothing to rotate", mirror.name);
			return Ok(MirrorOutcome::Unchanged);
		}

		let manager = RotationManager::new(self.executor);
		let rotation_error = |source| BackupError::Rotation { group: mirror.name.clone(), source };
		manager.ensure_root(&mirror.remote_root).await.map_err(rotation_error)?;
		let last_found = manager
			.rotate(&mirror.remote_root, &mirror.prefix, mirror.retain)
			.await
			.map_err(rotation_error)?;

		let target = mirror.generation_path(0);
		let reference = last_found.map(|slot| mirror.generation_path(slot));
		self.executor.run(&snapshot_command(&mirror.source, &target, reference.as_deref())).await?;

		// Only a finished snapshot may consume the marker
		self.executor.run(&RemoteCommand::new("cp").path_arg(&last_backup).path_arg(&last_rotation)).await?;
		info!("Finished mirror {}", mirror.name);
		Ok(MirrorOutcome::Rotated { reference })
	}

	/// Marker contents, creating an empty marker if there is none
	async fn read_marker(&self, path: &Path) -> Result<String, BackupError> {
		let command = RemoteCommand::new("touch")
			.path_arg(path)
			.and_then(RemoteCommand::new("cat").path_arg(path));
		let contents = self.executor.run(&command).await?;
		debug!("{}: {:?}", path.display(), contents.trim());
		Ok(contents)
	}
}

/// rsync run on the store, copying `source` into `target`
pub fn snapshot_command(source: &Path, target: &Path, reference: Option<&Path>) -> RemoteCommand {
	let mut command = RemoteCommand::new("rsync")
		.arg("-lptgoD")
		.arg("--numeric-ids")
		.arg("--delete")
		.arg("--delete-excluded")
		.arg("--recursive");
	if let Some(reference) = reference {
		command = command.arg(format!("--link-dest={}", relative_path(target, reference).display()));
	}
	command.arg(format!("{}/", source.to_string_lossy().trim_end_matches('/'))).path_arg(target)
}


// vim: ts=4
