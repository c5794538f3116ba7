//! Resumable, depth-bounded transfer of one location
//!
//! Directories shallower than the progress depth are copied shallowly and
//! checkpointed one by one; a directory at the progress depth is copied with
//! its whole subtree in a single transfer. Completed directories are skipped
//! on the next run, failed ones are retried.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::copier::{CopyOptions, Copier};
use crate::error::{BackupError, TransferError};
use crate::progress::{unit_id, ProgressStore};
use crate::utils::relative_path;

/// Lists the subdirectories of a source directory
#[async_trait]
pub trait DirLister: Send + Sync {
	async fn subdirs(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// `DirLister` on the local filesystem. Symlinks are never followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

#[async_trait]
impl DirLister for FsLister {
	async fn subdirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
		let mut dirs = Vec::new();
		let mut entries = tokio::fs::read_dir(path).await?;
		while let Some(entry) = entries.next_entry().await? {
			if entry.file_type().await?.is_dir() {
				dirs.push(entry.path());
			}
		}
		Ok(dirs)
	}
}

/// One location to transfer into a generation
#[derive(Debug, Clone)]
pub struct SyncJob {
	/// Location name, used to namespace progress units
	pub location: String,
	pub source_root: PathBuf,
	pub dest_root: PathBuf,
	/// Same location inside the dedup reference generation
	pub reference_root: Option<PathBuf>,
	pub exclude: Vec<String>,
	pub progress_depth: usize,
	pub verbose: bool,
}

/// A node that could not be transferred in this run
#[derive(Debug)]
pub struct NodeFailure {
	pub path: PathBuf,
	pub error: TransferError,
}

#[derive(Debug, Default)]
pub struct WalkReport {
	/// Transfers issued and succeeded
	pub transferred: usize,
	/// Nodes already complete from an earlier run
	pub skipped: usize,
	pub excluded: usize,
	pub failures: Vec<NodeFailure>,
}

impl WalkReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}
}

struct Pending {
	path: PathBuf,
	rel: PathBuf,
	depth: usize,
}

/// Prefix exclusion check.
///
/// Absolute patterns are compared with the node's source path, relative ones
/// with its path below the location root. Comparison is bytewise.
pub fn is_excluded(path: &Path, rel: &Path, patterns: &[String]) -> bool {
	let path = path.as_os_str().as_bytes();
	let rel = rel.as_os_str().as_bytes();
	patterns.iter().filter(|p| !p.is_empty()).any(|p| {
		if p.starts_with('/') {
			path.starts_with(p.as_bytes())
		} else {
			!rel.is_empty() && rel.starts_with(p.as_bytes())
		}
	})
}

/// Rewrite exclusion patterns into copy tool rules for one node.
///
/// Rules are anchored at the node being copied, so a recursive transfer
/// filters exactly what `is_excluded` would have skipped below it. Patterns
/// that cannot match anything below the node are dropped.
pub fn node_excludes(path: &Path, rel: &Path, patterns: &[String]) -> Vec<String> {
	let path = path.as_os_str().as_bytes();
	let rel = rel.as_os_str().as_bytes();
	patterns
		.iter()
		.filter(|p| !p.is_empty())
		.filter_map(|p| {
			let base = if p.starts_with('/') { path } else { rel };
			let rest = if base.is_empty() {
				p.as_str()
			} else if p.as_bytes().starts_with(base) && p.as_bytes().get(base.len()) == Some(&b'/') {
				p.get(base.len() + 1..)?
			} else {
				return None;
			};
			Some(format!("/{}*", escape_wildcards(rest)))
		})
		.collect()
}

fn escape_wildcards(literal: &str) -> String {
	let mut escaped = String::with_capacity(literal.len());
	for c in literal.chars() {
		if matches!(c, '*' | '?' | '[' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

pub struct SyncWalker<'a, C: Copier, L: DirLister> {
	copier: &'a C,
	lister: &'a L,
	progress: &'a mut ProgressStore,
}

impl<'a, C: Copier, L: DirLister> SyncWalker<'a, C, L> {
	pub fn new(copier: &'a C, lister: &'a L, progress: &'a mut ProgressStore) -> Self {
		SyncWalker { copier, lister, progress }
	}

	/// Walk `job` depth first.
	///
	/// Transfer and listing failures are collected in the report and never
	/// stop the walk; only a progress record that cannot be written does.
	pub async fn sync(&mut self, job: &SyncJob) -> Result<WalkReport, BackupError> {
		info!("Sync {} -> {}", job.source_root.display(), job.dest_root.display());

		let mut report = WalkReport::default();
		let mut visited = BTreeSet::new();
		let mut frontier =
			vec![Pending { path: job.source_root.clone(), rel: PathBuf::new(), depth: 0 }];

		while let Some(node) = frontier.pop() {
			if is_excluded(&node.path, &node.rel, &job.exclude) {
				debug!("Excluded {}", node.path.display());
				report.excluded += 1;
				continue;
			}

			let unit = unit_id(&job.location, &node.rel);
			visited.insert(unit.clone());
			let descend = node.depth < job.progress_depth;

			if self.progress.is_complete(&unit) {
				debug!("Already complete: {}", node.path.display());
				report.skipped += 1;
			} else {
				match self.transfer(job, &node, !descend).await {
					Ok(()) => {
						self.progress.mark_complete(&unit).await?;
						report.transferred += 1;
					}
					Err(e) => {
						error!("{}", e);
						report.failures.push(NodeFailure { path: node.path.clone(), error: e });
						// Children need this node's destination; they are retried with it
						continue;
					}
				}
			}

			if !descend {
				continue;
			}

			let mut children = match self.lister.subdirs(&node.path).await {
				Ok(children) => children,
				Err(e) => {
					let e = TransferError::ListFailed { path: node.path.clone(), source: e };
					error!("{}", e);
					report.failures.push(NodeFailure { path: node.path.clone(), error: e });
					continue;
				}
			};
			// Reverse order on the stack, so siblings are visited sorted
			children.sort();
			for child in children.into_iter().rev() {
				let name = match child.file_name() {
					Some(name) => name.to_os_string(),
					None => continue,
				};
				frontier.push(Pending {
					rel: node.rel.join(&name),
					path: node.path.join(&name),
					depth: node.depth + 1,
				});
			}
		}

		let stale = self.progress.units_for(&job.location).filter(|u| !visited.contains(*u)).count();
		if stale > 0 {
			warn!(
				"{} completed entries of {} no longer match the source tree; they are ignored",
				stale, job.location
			);
		}

		info!(
			"{}: {} transferred, {} already complete, {} excluded, {} failed",
			job.location,
			report.transferred,
			report.skipped,
			report.excluded,
			report.failures.len()
		);
		Ok(report)
	}

	async fn transfer(&self, job: &SyncJob, node: &Pending, recursive: bool) -> Result<(), TransferError> {
		let destination = job.dest_root.join(&node.rel);
		let reference = job
			.reference_root
			.as_ref()
			.map(|root| relative_path(&destination, &root.join(&node.rel)));

		debug!(
			"Transfer {} ({})",
			node.path.display(),
			if recursive { "recursive" } else { "shallow" }
		);
		let exclude = node_excludes(&node.path, &node.rel, &job.exclude);
		let options = CopyOptions {
			exclude: &exclude,
			recursive,
			dedup_reference: reference.as_deref(),
			verbose: job.verbose,
		};
		self.copier.copy(&node.path, &destination, &options).await
	}
}


// vim: ts=4
