//! In-memory stand-ins for the remote store, the copy tool and the source tree
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rotasync::copier::{CopyOptions, Copier};
use rotasync::error::{TransferError, TransportError};
use rotasync::remote::{RemoteCommand, RemoteExecutor};
use rotasync::walker::DirLister;

#[derive(Default)]
struct RemoteState {
	dirs: BTreeSet<PathBuf>,
	files: BTreeMap<PathBuf, String>,
	log: Vec<String>,
	violations: Vec<String>,
	fail_on: Option<String>,
}

/// Remote store holding a directory tree and small text files.
///
/// Understands `mkdir -p`, `ls -1`, `rm -rf`, `mv`, `touch`, `cat`, `cp` and
/// a store-local `rsync SRC/ DEST`, runs `&&` chains command by command and
/// stops a chain at the first failure.
#[derive(Default)]
pub struct MockRemote {
	state: Mutex<RemoteState>,
}

impl MockRemote {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_dirs(dirs: &[&str]) -> Self {
		let remote = Self::new();
		for dir in dirs {
			remote.add_dir(dir);
		}
		remote
	}

	pub fn add_dir(&self, dir: &str) {
		let mut state = self.state.lock().unwrap();
		mkdir_p(&mut state.dirs, Path::new(dir));
	}

	pub fn has_dir(&self, dir: &str) -> bool {
		self.state.lock().unwrap().dirs.contains(Path::new(dir))
	}

	pub fn write_file(&self, path: &str, contents: &str) {
		let mut state = self.state.lock().unwrap();
		if let Some(parent) = Path::new(path).parent() {
			mkdir_p(&mut state.dirs, parent);
		}
		state.files.insert(PathBuf::from(path), contents.to_string());
	}

	pub fn read_file(&self, path: &str) -> Option<String> {
		self.state.lock().unwrap().files.get(Path::new(path)).cloned()
	}

	/// Immediate children of `dir`
	pub fn children(&self, dir: &str) -> Vec<String> {
		let state = self.state.lock().unwrap();
		list(&state.dirs, Path::new(dir))
	}

	/// Fail every command whose program is `program`
	pub fn fail_on(&self, program: &str) {
		self.state.lock().unwrap().fail_on = Some(program.to_string());
	}

	pub fn heal(&self) {
		self.state.lock().unwrap().fail_on = None;
	}

	/// Rendered command lines, one per round trip
	pub fn log(&self) -> Vec<String> {
		self.state.lock().unwrap().log.clone()
	}

	pub fn clear_log(&self) {
		self.state.lock().unwrap().log.clear();
	}

	/// Round trips whose first program is `program`
	pub fn count(&self, program: &str) -> usize {
		self.log().iter().filter(|l| l.split(' ').next() == Some(program)).count()
	}

	/// Renames that targeted an existing directory
	pub fn violations(&self) -> Vec<String> {
		self.state.lock().unwrap().violations.clone()
	}
}

fn failed(command: &[&str], stderr: &str) -> TransportError {
	TransportError::CommandFailed { command: command.join(" "), code: Some(1), stderr: stderr.to_string() }
}

fn mkdir_p(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
	for ancestor in path.ancestors() {
		if ancestor.as_os_str().is_empty() {
			break;
		}
		dirs.insert(ancestor.to_path_buf());
	}
}

fn list(dirs: &BTreeSet<PathBuf>, path: &Path) -> Vec<String> {
	dirs.iter()
		.filter(|d| d.parent() == Some(path))
		.filter_map(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
		.collect()
}

fn subtree(dirs: &BTreeSet<PathBuf>, root: &Path) -> Vec<PathBuf> {
	dirs.iter().filter(|d| d.starts_with(root)).cloned().collect()
}

fn files_below(files: &BTreeMap<PathBuf, String>, root: &Path) -> Vec<(PathBuf, String)> {
	files.iter().filter(|(f, _)| f.starts_with(root)).map(|(f, c)| (f.clone(), c.clone())).collect()
}

fn remove_tree(state: &mut RemoteState, root: &Path) {
	for dir in subtree(&state.dirs, root) {
		state.dirs.remove(&dir);
	}
	for (file, _) in files_below(&state.files, root) {
		state.files.remove(&file);
	}
}

/// Copy `from` to `to`, replacing whatever was at `to`
fn copy_tree(state: &mut RemoteState, from: &Path, to: &Path, keep_source: bool) {
	let dirs = subtree(&state.dirs, from);
	let files = files_below(&state.files, from);
	if !keep_source {
		remove_tree(state, from);
	}
	remove_tree(state, to);
	mkdir_p(&mut state.dirs, to);
	for dir in dirs {
		if let Ok(rest) = dir.strip_prefix(from) {
			state.dirs.insert(to.join(rest));
		}
	}
	for (file, contents) in files {
		if let Ok(rest) = file.strip_prefix(from) {
			state.files.insert(to.join(rest), contents);
		}
	}
}

#[async_trait]
impl RemoteExecutor for MockRemote {
	async fn run(&self, command: &RemoteCommand) -> Result<String, TransportError> {
		let mut state = self.state.lock().unwrap();
		state.log.push(command.render());

		let mut output = String::new();
		for words in command.commands() {
			if state.fail_on.as_deref() == words.first().copied() {
				return Err(failed(&words, "injected failure"));
			}
			match words.as_slice() {
				["mkdir", "-p", path] => mkdir_p(&mut state.dirs, Path::new(path)),
				["ls", "-1", path] => {
					if !state.dirs.contains(Path::new(path)) {
						return Err(failed(&words, "No such file or directory"));
					}
					for name in list(&state.dirs, Path::new(path)) {
						output.push_str(&name);
						output.push('\n');
					}
				}
				["rm", "-rf", path] => remove_tree(&mut state, Path::new(path)),
				["mv", from, to] => {
					let (from, to) = (Path::new(from), Path::new(to));
					if state.dirs.contains(to) {
						state.violations.push(words.join(" "));
						return Err(failed(&words, "target exists"));
					}
					if !state.dirs.contains(from) {
						return Err(failed(&words, "No such file or directory"));
					}
					copy_tree(&mut state, from, to, false);
				}
				["touch", path] => {
					state.files.entry(PathBuf::from(path)).or_default();
				}
				["cat", path] => match state.files.get(Path::new(path)) {
					Some(contents) => output.push_str(contents),
					None => return Err(failed(&words, "No such file or directory")),
				},
				["cp", from, to] => match state.files.get(Path::new(from)).cloned() {
					Some(contents) => {
						state.files.insert(PathBuf::from(to), contents);
					}
					None => return Err(failed(&words, "No such file or directory")),
				},
				["rsync", .., from, to] => {
					let from = Path::new(from.trim_end_matches('/'));
					if !state.dirs.contains(from) {
						return Err(failed(&words, "change_dir failed: No such file or directory"));
					}
					copy_tree(&mut state, from, Path::new(to), true);
				}
				_ => return Err(failed(&words, "unsupported command")),
			}
		}
		Ok(output)
	}
}

/// One recorded `Copier::copy` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCall {
	pub source: PathBuf,
	pub destination: PathBuf,
	pub recursive: bool,
	pub reference: Option<PathBuf>,
	pub exclude: Vec<String>,
}

#[derive(Default)]
pub struct MockCopier {
	calls: Mutex<Vec<CopyCall>>,
	failing: Mutex<BTreeSet<PathBuf>>,
}

impl MockCopier {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make copies of `source` fail until healed
	pub fn fail(&self, source: &str) {
		self.failing.lock().unwrap().insert(PathBuf::from(source));
	}

	pub fn heal(&self) {
		self.failing.lock().unwrap().clear();
	}

	pub fn calls(&self) -> Vec<CopyCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn sources(&self) -> Vec<PathBuf> {
		self.calls().into_iter().map(|c| c.source).collect()
	}

	pub fn clear(&self) {
		self.calls.lock().unwrap().clear();
	}
}

#[async_trait]
impl Copier for MockCopier {
	async fn copy(
		&self,
		source: &Path,
		destination: &Path,
		options: &CopyOptions<'_>,
	) -> Result<(), TransferError> {
		if self.failing.lock().unwrap().contains(source) {
			return Err(TransferError::CopyFailed {
				source_path: source.to_path_buf(),
				code: Some(23),
				stderr: "some files could not be transferred".to_string(),
			});
		}
		self.calls.lock().unwrap().push(CopyCall {
			source: source.to_path_buf(),
			destination: destination.to_path_buf(),
			recursive: options.recursive,
			reference: options.dedup_reference.map(Path::to_path_buf),
			exclude: options.exclude.to_vec(),
		});
		Ok(())
	}
}

/// Source tree given as a list of directories
#[derive(Default)]
pub struct MapLister {
	children: BTreeMap<PathBuf, Vec<PathBuf>>,
	failing: Mutex<BTreeSet<PathBuf>>,
}

impl MapLister {
	pub fn new(dirs: &[&str]) -> Self {
		Self::from_paths(dirs.iter().map(PathBuf::from).collect())
	}

	/// Tree from raw paths, for names that are not valid UTF-8
	pub fn from_paths(dirs: Vec<PathBuf>) -> Self {
		let mut children: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
		for dir in &dirs {
			children.entry(dir.clone()).or_default();
			if let Some(parent) = dir.parent() {
				if dirs.iter().any(|d| d == parent) {
					children.entry(parent.to_path_buf()).or_default().push(dir.clone());
				}
			}
		}
		MapLister { children, failing: Mutex::new(BTreeSet::new()) }
	}

	pub fn fail(&self, path: &str) {
		self.failing.lock().unwrap().insert(PathBuf::from(path));
	}

	pub fn heal(&self) {
		self.failing.lock().unwrap().clear();
	}
}

#[async_trait]
impl DirLister for MapLister {
	async fn subdirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
		if self.failing.lock().unwrap().contains(path) {
			return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
		}
		self.children
			.get(path)
			.cloned()
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such directory"))
	}
}

// vim: ts=4
