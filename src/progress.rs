//! Persistent record of completed transfer units for one backup attempt
//!
//! The record is a text file with one unit identifier per line. A unit is
//! only ever added after the transfer it certifies has succeeded, and every
//! change rewrites the whole file through a temporary sibling and a rename,
//! so a crash leaves either the previous or the new record on disk.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ProgressError;

/// Sentinel unit marking the whole attempt as finished
pub const DONE_UNIT: &str = ":done";

/// Sentinel unit present while the rotation step is in flight
pub const ROTATING_UNIT: &str = ":rotating";

/// Record file of a rotation group inside the state directory
pub fn progress_path(state_dir: &Path, group: &str) -> PathBuf {
	state_dir.join(format!("{}.progress", group))
}

/// Identifier of a directory node: `<location>:<path relative to the location root>`.
///
/// The path is encoded losslessly on one line: backslash, newline and
/// carriage return are escaped, bytes that are not valid UTF-8 become `\xHH`.
pub fn unit_id(location: &str, rel: &Path) -> String {
	let mut id = format!("{}:", location);
	if rel.as_os_str().is_empty() {
		id.push('.');
		return id;
	}

	let mut bytes = rel.as_os_str().as_bytes();
	while !bytes.is_empty() {
		let (valid, invalid) = match std::str::from_utf8(bytes) {
			Ok(s) => (s, 0),
			Err(e) => {
				let valid = std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default();
				(valid, e.error_len().unwrap_or(bytes.len() - e.valid_up_to()))
			}
		};
		for c in valid.chars() {
			match c {
				'\\' => id.push_str("\\\\"),
				'\n' => id.push_str("\\n"),
				'\r' => id.push_str("\\r"),
				c => id.push(c),
			}
		}
		let end = valid.len() + invalid;
		for b in &bytes[valid.len()..end] {
			id.push_str(&format!("\\x{:02x}", b));
		}
		bytes = &bytes[end..];
	}
	id
}

#[derive(Debug)]
pub struct ProgressStore {
	path: PathBuf,
	units: BTreeSet<String>,
	exists: bool,
}

impl ProgressStore {
	/// Load the record at `path`; a missing file yields an empty store.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
		let path = path.into();
		let contents = match tokio::fs::read_to_string(&path).await {
			Ok(contents) => Some(contents),
			Err(e) if e.kind() == ErrorKind::NotFound => None,
			Err(e) => return Err(ProgressError::LoadFailed { path, source: e }),
		};

		let mut units = BTreeSet::new();
		let exists = contents.is_some();
		if let Some(contents) = contents {
			for line in contents.lines() {
				let line = line.trim_end_matches('\r');
				if line.is_empty() {
					continue;
				}
				if !line.contains(':') {
					warn!("Ignoring malformed entry {:?} in {}", line, path.display());
					continue;
				}
				units.insert(line.to_string());
			}
			debug!("Loaded {} entries from {}", units.len(), path.display());
		}

		Ok(ProgressStore { path, units, exists })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether a record is present on disk
	pub fn exists(&self) -> bool {
		self.exists
	}

	pub fn is_complete(&self, unit: &str) -> bool {
		self.units.contains(unit)
	}

	/// Record a successfully transferred unit and persist immediately.
	pub async fn mark_complete(&mut self, unit: &str) -> Result<(), ProgressError> {
		if unit.starts_with(':') || unit.contains('\n') || !unit.contains(':') {
			return Err(ProgressError::InvalidUnit { unit: unit.to_string() });
		}
		if self.units.insert(unit.to_string()) {
			self.save().await?;
		}
		Ok(())
	}

	pub fn is_done(&self) -> bool {
		self.units.contains(DONE_UNIT)
	}

	pub async fn mark_done(&mut self) -> Result<(), ProgressError> {
		self.units.insert(DONE_UNIT.to_string());
		self.save().await
	}

	pub fn is_rotating(&self) -> bool {
		self.units.contains(ROTATING_UNIT)
	}

	/// Replace the record with the rotation-in-flight marker.
	pub async fn begin_rotation(&mut self) -> Result<(), ProgressError> {
		self.units.clear();
		self.units.insert(ROTATING_UNIT.to_string());
		self.save().await
	}

	/// Atomically replace the record with an empty, in-flight one.
	pub async fn restart(&mut self) -> Result<(), ProgressError> {
		self.units.clear();
		self.save().await
	}

	/// Clear all state and remove the record file.
	pub async fn reset(&mut self) -> Result<(), ProgressError> {
		self.units.clear();
		match tokio::fs::remove_file(&self.path).await {
			Ok(()) => {}
			Err(e) if e.kind() == ErrorKind::NotFound => {}
			Err(e) => return Err(ProgressError::SaveFailed { path: self.path.clone(), source: e }),
		}
		self.exists = false;
		Ok(())
	}

	/// Completed units, sentinels excluded
	pub fn units(&self) -> impl Iterator<Item = &str> {
		self.units.iter().map(String::as_str).filter(|u| !u.starts_with(':'))
	}

	/// Completed units belonging to one location
	pub fn units_for<'a>(&'a self, location: &str) -> impl Iterator<Item = &'a str> + 'a {
		let prefix = format!("{}:", location);
		self.units().filter(move |u| u.starts_with(&prefix))
	}

	async fn save(&mut self) -> Result<(), ProgressError> {
		let save_err = |path: &Path, e| ProgressError::SaveFailed { path: path.to_path_buf(), source: e };

		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await.map_err(|e| save_err(parent, e))?;
			}
		}

		let mut contents = String::new();
		for unit in &self.units {
			contents.push_str(unit);
			contents.push('\n');
		}

		let tmp = tmp_path(&self.path);
		tokio::fs::write(&tmp, contents).await.map_err(|e| save_err(&tmp, e))?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|e| save_err(&self.path, e))?;
		self.exists = true;
		Ok(())
	}
}

fn tmp_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".tmp");
	path.with_file_name(name)
}


// vim: ts=4
