//! Resolved backup model, built from the configuration file

use serde::Serialize;
use std::path::PathBuf;

/// A named backup unit with its own numbered generations on the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationGroup {
	pub name: String,

	/// Remote directory holding the `<prefix>.<n>` generation slots
	pub remote_root: PathBuf,

	pub prefix: String,

	/// Number of generations kept; slot `retain` is evicted on rotation
	pub retain: u32,

	pub require_root: bool,

	pub locations: Vec<Location>,
}

impl RotationGroup {
	pub fn generation_name(&self, slot: u32) -> String {
		format!("{}.{}", self.prefix, slot)
	}

	pub fn generation_path(&self, slot: u32) -> PathBuf {
		self.remote_root.join(self.generation_name(slot))
	}

	/// True when the group or any of its locations needs root privileges
	pub fn needs_root(&self) -> bool {
		self.require_root || self.locations.iter().any(|l| l.require_root)
	}
}

/// A source subtree backed up into every generation of its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
	pub name: String,

	pub source: PathBuf,

	/// Path relative to the generation root
	pub destination: PathBuf,

	/// Exclusion prefixes, merged from defaults, group and location
	pub exclude: Vec<String>,

	/// Directories shallower than this are checkpointed one by one
	pub progress_depth: usize,

	pub require_root: bool,
}

/// A copy kept current on the backup store by some other client, turned into
/// numbered generations on the store itself whenever it changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorRotation {
	pub name: String,

	/// Remote directory holding the shared copy and its markers
	pub source: PathBuf,

	/// Remote directory holding the `<prefix>.<n>` generation slots
	pub remote_root: PathBuf,

	pub prefix: String,

	pub retain: u32,
}

impl MirrorRotation {
	pub fn generation_path(&self, slot: u32) -> PathBuf {
		self.remote_root.join(format!("{}.{}", self.prefix, slot))
	}
}

/// Where the remote host address comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSource {
	Fixed(String),
	/// Shell command printing the address on stdout
	Script(String),
}

/// SSH identity of the backup store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
	pub username: String,
	pub host: HostSource,
	pub port: u16,
	pub identity_file: Option<PathBuf>,
}


// vim: ts=4
