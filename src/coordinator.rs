//! Sequencing of one backup attempt for a rotation group
//!
//! A fresh attempt rotates the generations and starts a new progress record;
//! a resumed attempt leaves the generations alone and continues filling
//! slot 0. Both then walk every location and mark the record done once
//! nothing is left to transfer.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::copier::Copier;
use crate::error::BackupError;
use crate::progress::{progress_path, ProgressStore};
use crate::remote::{RemoteCommand, RemoteExecutor};
use crate::rotation::RotationManager;
use crate::types::RotationGroup;
use crate::utils::RunLock;
use crate::walker::{DirLister, SyncJob, SyncWalker, WalkReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptMode {
	/// Rotate and start a new generation
	Fresh,
	/// Continue an interrupted attempt without rotating
	Resuming,
}

/// Pick the attempt mode from the state of the previous attempt.
///
/// A record left in the middle of a rotation cannot be resumed safely and is
/// only overridden by `force_new`.
pub fn attempt_mode(progress: &ProgressStore, force_new: bool, group: &str) -> Result<AttemptMode, BackupError> {
	if force_new || !progress.exists() || progress.is_done() {
		return Ok(AttemptMode::Fresh);
	}
	if progress.is_rotating() {
		return Err(BackupError::RotationInterrupted { group: group.to_string() });
	}
	Ok(AttemptMode::Resuming)
}

#[derive(Debug)]
pub struct LocationReport {
	pub name: String,
	pub walk: WalkReport,
}

#[derive(Debug)]
pub struct BackupReport {
	pub group: String,
	pub mode: AttemptMode,
	/// Generation used as dedup reference
	pub reference: Option<PathBuf>,
	pub locations: Vec<LocationReport>,
}

impl BackupReport {
	/// True when every node was transferred and the attempt is marked done
	pub fn is_complete(&self) -> bool {
		self.locations.iter().all(|l| l.walk.is_clean())
	}

	pub fn failure_count(&self) -> usize {
		self.locations.iter().map(|l| l.walk.failures.len()).sum()
	}
}

pub struct BackupCoordinator<'a, E: RemoteExecutor, C: Copier, L: DirLister> {
	executor: &'a E,
	copier: &'a C,
	lister: &'a L,
	state_dir: PathBuf,
	verbose_transfers: bool,
}

impl<'a, E: RemoteExecutor, C: Copier, L: DirLister> BackupCoordinator<'a, E, C, L> {
	pub fn new(executor: &'a E, copier: &'a C, lister: &'a L, state_dir: impl Into<PathBuf>) -> Self {
		BackupCoordinator { executor, copier, lister, state_dir: state_dir.into(), verbose_transfers: false }
	}

	/// Ask the copy tool for verbose output
	pub fn verbose_transfers(mut self, verbose: bool) -> Self {
		self.verbose_transfers = verbose;
		self
	}

	pub fn state_dir(&self) -> &Path {
		&self.state_dir
	}

	/// Run one attempt for `group`
	pub async fn run(&self, group: &RotationGroup, force_new: bool) -> Result<BackupReport, BackupError> {
		let _lock = RunLock::acquire(&self.state_dir, &group.name).await?;
		let mut progress = ProgressStore::open(progress_path(&self.state_dir, &group.name)).await?;

		let mode = attempt_mode(&progress, force_new, &group.name)?;
		let rotation = RotationManager::new(self.executor);
		rotation.ensure_root(&group.remote_root).await?;

		let reference_slot = match mode {
			AttemptMode::Fresh => {
				info!("Start new generation of {}", group.name);
				progress.begin_rotation().await?;
				let last_found = rotation
					.rotate(&group.remote_root, &group.prefix, group.retain)
					.await
					.map_err(|e| BackupError::Rotation { group: group.name.clone(), source: e })?;
				progress.restart().await?;
				last_found
			}
			AttemptMode::Resuming => {
				info!("Resume interrupted backup of {}", group.name);
				rotation.find_reference(&group.remote_root, &group.prefix).await?
			}
		};

		let generation_root = group.generation_path(0);
		let reference_root = reference_slot.map(|slot| group.generation_path(slot));
		match &reference_root {
			Some(reference) => info!("Link unchanged files against {}", reference.display()),
			None => info!("No previous generation, transferring everything"),
		}

		let mut report = BackupReport {
			group: group.name.clone(),
			mode,
			reference: reference_root.clone(),
			locations: Vec::new(),
		};

		for location in &group.locations {
			info!("Process location {}", location.name);
			let dest_root = generation_root.join(&location.destination);
			self.executor.run(&RemoteCommand::mkdir_p(&dest_root)).await?;

			let job = SyncJob {
				location: location.name.clone(),
				source_root: location.source.clone(),
				dest_root,
				reference_root: reference_root.as_ref().map(|r| r.join(&location.destination)),
				exclude: location.exclude.clone(),
				progress_depth: location.progress_depth,
				verbose: self.verbose_transfers,
			};
			let walk = SyncWalker::new(self.copier, self.lister, &mut progress).sync(&job).await?;
			report.locations.push(LocationReport { name: location.name.clone(), walk });
		}

		if report.is_complete() {
			progress.mark_done().await?;
			info!("Finished {}", group.name);
		} else {
			warn!(
				"{} of {} failed to transfer; run again to retry them",
				report.failure_count(),
				group.name
			);
		}
		Ok(report)
	}
}


// vim: ts=4
