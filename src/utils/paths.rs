//! Path helpers: home directory expansion and lexical relative paths

use nix::unistd::User;
use std::env;
use std::path::{Component, Path, PathBuf};

/// Expand a leading `~/`.
///
/// Under sudo the home directory of the invoking user (`$SUDO_USER`, looked
/// up in the user database) is used, so that `sudo rotasync` reads the same
/// config as the user would.
pub fn expand_user(path: &Path) -> PathBuf {
	let rest = match path.strip_prefix("~") {
		Ok(rest) => rest,
		Err(_) => return path.to_path_buf(),
	};
	match home_dir() {
		Some(home) => home.join(rest),
		None => path.to_path_buf(),
	}
}

fn home_dir() -> Option<PathBuf> {
	if let Ok(user) = env::var("SUDO_USER") {
		if !user.is_empty() {
			if let Some(home) = home_of(&user) {
				return Some(home);
			}
		}
	}
	env::var_os("HOME").map(PathBuf::from)
}

fn home_of(user: &str) -> Option<PathBuf> {
	match User::from_name(user) {
		Ok(Some(user)) => Some(user.dir),
		_ => None,
	}
}

/// Lexical path of `to` relative to the directory `from`.
///
/// Used for `--link-dest`, which rsync resolves against the destination directory.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
	let from: Vec<Component> = from.components().filter(|c| *c != Component::CurDir).collect();
	let to: Vec<Component> = to.components().filter(|c| *c != Component::CurDir).collect();

	let common = from.iter().zip(to.iter()).take_while(|(a, b)| a == b).count();

	let mut rel = PathBuf::new();
	for _ in common..from.len() {
		rel.push("..");
	}
	for c in &to[common..] {
		rel.push(c.as_os_str());
	}
	if rel.as_os_str().is_empty() {
		rel.push(".");
	}
	rel
}


// vim: ts=4
