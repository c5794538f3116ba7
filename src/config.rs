//! Configuration file for rotasync
//!
//! The file is TOML (or JSON5 when it ends in `.json`/`.json5`):
//!
//! ```toml
//! logfile = "~/.rotasync/rotasync.log"
//! default_group = "daily"
//!
//! [remote]
//! username = "backup"
//! ip_script = "~/bin/find-nas"     # or: host = "nas.local"
//! port = 22
//! identity_file = "~/.ssh/id_backup"
//!
//! [defaults]
//! retain = 7
//! progress_depth = 2
//!
//! [groups.daily]
//! remote_root = "/srv/backup/laptop"
//!
//! [groups.daily.locations.home]
//! source = "/home/me"
//! exclude = ["/home/me/.cache"]
//!
//! # Generations of a shared copy, rotated on the store by `rotasync rotate`
//! [mirrors.family]
//! source = "/srv/share/family"
//! remote_root = "/srv/history/family"
//! ```
//!
//! Scalar settings fall back from location to group to `[defaults]`;
//! exclusion lists are concatenated from all three levels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::{HostSource, Location, MirrorRotation, RemoteTarget, RotationGroup};
use crate::utils::expand_user;
use crate::validation::Validator;

pub const DEFAULT_CONFIG_PATH: &str = "~/.rotasync.toml";
pub const DEFAULT_STATE_DIR: &str = "~/.rotasync";
pub const DEFAULT_PREFIX: &str = "v";
pub const DEFAULT_RETAIN: u32 = 7;
pub const DEFAULT_PROGRESS_DEPTH: usize = 2;
pub const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// Log file receiving debug level output
	pub logfile: Option<PathBuf>,

	/// Directory for progress records and run locks
	pub state_dir: Option<PathBuf>,

	/// Group used when none is given on the command line
	pub default_group: Option<String>,

	pub remote: RemoteConfig,

	pub defaults: GroupSettings,

	pub groups: BTreeMap<String, GroupConfig>,

	pub mirrors: BTreeMap<String, MirrorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
	pub username: Option<String>,

	/// Fixed host name or address
	pub host: Option<String>,

	/// Command printing the host address, used when `host` is not set
	pub ip_script: Option<String>,

	pub port: Option<u16>,

	pub identity_file: Option<PathBuf>,
}

/// Fallbacks for every group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupSettings {
	pub prefix: Option<String>,
	pub retain: Option<u32>,
	pub progress_depth: Option<usize>,
	pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
	pub remote_root: Option<PathBuf>,

	pub prefix: Option<String>,
	pub retain: Option<u32>,
	pub progress_depth: Option<usize>,
	pub exclude: Vec<String>,

	pub require_root: bool,

	pub locations: BTreeMap<String, LocationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationConfig {
	pub source: Option<PathBuf>,

	/// Defaults to the location name
	pub destination: Option<PathBuf>,

	pub exclude: Vec<String>,

	pub progress_depth: Option<usize>,

	pub require_root: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
	/// Remote directory holding the shared copy
	pub source: Option<PathBuf>,

	pub remote_root: Option<PathBuf>,

	pub prefix: Option<String>,
	pub retain: Option<u32>,
}

impl Config {
	/// Load and parse a config file
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let path = expand_user(path);
		let contents = std::fs::read_to_string(&path)
			.map_err(|e| ConfigError::ReadFailed { path: path.clone(), source: e })?;

		let is_json = matches!(path.extension().and_then(|e| e.to_str()), Some("json") | Some("json5"));
		Self::parse(&contents, is_json)
			.map_err(|message| ConfigError::ParseFailed { path: path.clone(), message })
	}

	/// Parse config text, JSON5 if `json` is set, TOML otherwise
	pub fn parse(contents: &str, json: bool) -> Result<Self, String> {
		if json {
			json5::from_str(contents).map_err(|e| e.to_string())
		} else {
			toml::from_str(contents).map_err(|e| e.to_string())
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		expand_user(self.state_dir.as_deref().unwrap_or_else(|| Path::new(DEFAULT_STATE_DIR)))
	}

	pub fn logfile(&self) -> Option<PathBuf> {
		self.logfile.as_deref().map(expand_user)
	}

	/// Name of the group to run: `name` if given, else `default_group`,
	/// else the only configured group.
	pub fn group_name<'a>(&'a self, name: Option<&'a str>) -> Result<&'a str, ConfigError> {
		if let Some(name) = name.filter(|n| !n.is_empty()) {
			return Ok(name);
		}
		if let Some(name) = self.default_group.as_deref() {
			return Ok(name);
		}
		let mut names = self.groups.keys();
		match (names.next(), names.next()) {
			(Some(only), None) => Ok(only.as_str()),
			_ => Err(ConfigError::Missing { key: "default_group".to_string(), section: "top level".to_string() }),
		}
	}

	/// Resolve a group with all fallbacks applied, and validate it
	pub fn group(&self, name: &str) -> Result<RotationGroup, ConfigError> {
		let group = self
			.groups
			.get(name)
			.ok_or_else(|| ConfigError::UnknownGroup { name: name.to_string() })?;
		let section = format!("groups.{}", name);

		let remote_root = group
			.remote_root
			.as_deref()
			.ok_or_else(|| ConfigError::Missing { key: "remote_root".to_string(), section: section.clone() })?;

		let prefix = group
			.prefix
			.clone()
			.or_else(|| self.defaults.prefix.clone())
			.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
		let retain = group.retain.or(self.defaults.retain).unwrap_or(DEFAULT_RETAIN);
		let group_depth = group
			.progress_depth
			.or(self.defaults.progress_depth)
			.unwrap_or(DEFAULT_PROGRESS_DEPTH);

		let mut locations = Vec::new();
		for (loc_name, loc) in &group.locations {
			let source = loc.source.as_deref().ok_or_else(|| ConfigError::Missing {
				key: "source".to_string(),
				section: format!("{}.locations.{}", section, loc_name),
			})?;

			let exclude = self
				.defaults
				.exclude
				.iter()
				.chain(group.exclude.iter())
				.chain(loc.exclude.iter())
				.cloned()
				.collect();

			locations.push(Location {
				name: loc_name.clone(),
				source: expand_user(source),
				destination: loc.destination.clone().unwrap_or_else(|| PathBuf::from(loc_name)),
				exclude,
				progress_depth: loc.progress_depth.unwrap_or(group_depth),
				require_root: loc.require_root,
			});
		}

		let group = RotationGroup {
			name: name.to_string(),
			remote_root: remote_root.to_path_buf(),
			prefix,
			retain,
			require_root: group.require_root,
			locations,
		};
		group.validate()?;
		Ok(group)
	}

	/// Names of all configured mirrors
	pub fn mirror_names(&self) -> impl Iterator<Item = &str> {
		self.mirrors.keys().map(String::as_str)
	}

	/// Resolve a mirror with `[defaults]` applied, and validate it
	pub fn mirror(&self, name: &str) -> Result<MirrorRotation, ConfigError> {
		let mirror = self
			.mirrors
			.get(name)
			.ok_or_else(|| ConfigError::UnknownMirror { name: name.to_string() })?;
		let missing = |key: &str| ConfigError::Missing { key: key.to_string(), section: format!("mirrors.{}", name) };

		let mirror = MirrorRotation {
			name: name.to_string(),
			source: mirror.source.clone().ok_or_else(|| missing("source"))?,
			remote_root: mirror.remote_root.clone().ok_or_else(|| missing("remote_root"))?,
			prefix: mirror
				.prefix
				.clone()
				.or_else(|| self.defaults.prefix.clone())
				.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
			retain: mirror.retain.or(self.defaults.retain).unwrap_or(DEFAULT_RETAIN),
		};
		mirror.validate()?;
		Ok(mirror)
	}

	/// Resolve and validate the `[remote]` table
	pub fn remote_target(&self) -> Result<RemoteTarget, ConfigError> {
		let remote = &self.remote;
		let missing = |key: &str| ConfigError::Missing { key: key.to_string(), section: "remote".to_string() };

		let username = remote.username.clone().ok_or_else(|| missing("username"))?;
		let host = match (&remote.host, &remote.ip_script) {
			(Some(host), _) => HostSource::Fixed(host.clone()),
			(None, Some(script)) => HostSource::Script(expand_script(script)),
			(None, None) => return Err(missing("host")),
		};

		let target = RemoteTarget {
			username,
			host,
			port: remote.port.unwrap_or(DEFAULT_PORT),
			identity_file: remote.identity_file.as_deref().map(expand_user),
		};
		target.validate()?;
		Ok(target)
	}
}

/// Expand `~/` in the script's program path only
fn expand_script(script: &str) -> String {
	match script.split_once(' ') {
		Some((program, args)) => format!("{} {}", expand_user(Path::new(program)).display(), args),
		None => expand_user(Path::new(script)).display().to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
default_group = "daily"

[remote]
username = "backup"
host = "nas.local"
port = 2222

[defaults]
retain = 5
exclude = ["/home/me/.cache"]

[groups.daily]
remote_root = "/srv/backup/laptop"
prefix = "daily"
exclude = ["tmp"]

[groups.daily.locations.home]
source = "/home/me"
exclude = ["/home/me/Downloads"]
progress_depth = 3

[groups.daily.locations.etc]
source = "/etc"
destination = "system/etc"
require_root = true
"#;

	#[test]
	fn test_group_fallbacks() {
		let config = Config::parse(SAMPLE, false).unwrap();
		let group = config.group("daily").unwrap();

		assert_eq!(group.prefix, "daily");
		assert_eq!(group.retain, 5);
		assert!(group.needs_root());
		assert_eq!(group.locations.len(), 2);

		// BTreeMap order: etc before home
		let etc = &group.locations[0];
		assert_eq!(etc.destination, PathBuf::from("system/etc"));
		assert_eq!(etc.progress_depth, DEFAULT_PROGRESS_DEPTH);

		let home = &group.locations[1];
		assert_eq!(home.destination, PathBuf::from("home"));
		assert_eq!(home.progress_depth, 3);
		assert_eq!(home.exclude, vec!["/home/me/.cache", "tmp", "/home/me/Downloads"]);
	}

	#[test]
	fn test_group_name_resolution() {
		let config = Config::parse(SAMPLE, false).unwrap();
		assert_eq!(config.group_name(None).unwrap(), "daily");
		assert_eq!(config.group_name(Some("weekly")).unwrap(), "weekly");
		assert!(matches!(config.group("weekly"), Err(ConfigError::UnknownGroup { .. })));
	}

	#[test]
	fn test_missing_remote_root() {
		let config = Config::parse("[groups.g.locations.a]\nsource = \"/a\"\n", false).unwrap();
		match config.group("g") {
			Err(ConfigError::Missing { key, .. }) => assert_eq!(key, "remote_root"),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_remote_target() {
		let config = Config::parse(SAMPLE, false).unwrap();
		let target = config.remote_target().unwrap();
		assert_eq!(target.host, HostSource::Fixed("nas.local".to_string()));
		assert_eq!(target.port, 2222);
		assert_eq!(target.identity_file, None);
	}

	#[test]
	fn test_remote_requires_host_or_script() {
		let config = Config::parse("[remote]\nusername = \"b\"\n", false).unwrap();
		assert!(matches!(config.remote_target(), Err(ConfigError::Missing { .. })));

		let config = Config::parse("[remote]\nusername = \"b\"\nip_script = \"find-nas --lan\"\n", false).unwrap();
		assert_eq!(
			config.remote_target().unwrap().host,
			HostSource::Script("find-nas --lan".to_string())
		);
	}

	#[test]
	fn test_unknown_key_rejected() {
		assert!(Config::parse("[remote]\nusernme = \"b\"\n", false).is_err());
	}

	#[test]
	fn test_mirror_resolution() {
		let toml = format!(
			"{}\n[mirrors.family]\nsource = \"/srv/share/family\"\nremote_root = \"/srv/history/family\"\n",
			SAMPLE
		);
		let config = Config::parse(&toml, false).unwrap();
		assert_eq!(config.mirror_names().collect::<Vec<_>>(), vec!["family"]);

		let mirror = config.mirror("family").unwrap();
		assert_eq!(mirror.retain, 5);
		assert_eq!(mirror.prefix, DEFAULT_PREFIX);
		assert_eq!(mirror.generation_path(0), PathBuf::from("/srv/history/family/v.0"));
		assert!(matches!(config.mirror("other"), Err(ConfigError::UnknownMirror { .. })));
	}

	#[test]
	fn test_mirror_requires_source() {
		let config = Config::parse("[mirrors.m]\nremote_root = \"/h\"\n", false).unwrap();
		match config.mirror("m") {
			Err(ConfigError::Missing { key, section }) => {
				assert_eq!(key, "source");
				assert_eq!(section, "mirrors.m");
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_json5_config() {
		let json = r#"{
			remote: { username: "backup", host: "nas" },
			groups: { weekly: { remote_root: "/srv/b", retain: 2, locations: { docs: { source: "/docs" } } } },
		}"#;
		let config = Config::parse(json, true).unwrap();
		assert_eq!(config.group_name(None).unwrap(), "weekly");
		let group = config.group("weekly").unwrap();
		assert_eq!(group.retain, 2);
		assert_eq!(group.prefix, DEFAULT_PREFIX);
	}
}

// vim: ts=4
