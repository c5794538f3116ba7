//! Transfer of one source directory to the backup store

use async_trait::async_trait;
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::TransferError;
use crate::remote::{shell_quote, SshSession};

/// Options for a single transfer
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions<'a> {
	/// Exclusion rules anchored at `source`, in rsync filter syntax
	pub exclude: &'a [String],

	/// Copy the whole subtree instead of the directory's immediate entries
	pub recursive: bool,

	/// Previous generation's copy of this directory, relative to `destination`.
	/// Unchanged files are hard-linked from there instead of transferred.
	pub dedup_reference: Option<&'a Path>,

	pub verbose: bool,
}

/// Copies a source directory to a remote destination directory.
///
/// A failed copy must leave the destination such that repeating the call
/// with the same arguments converges to the correct result.
#[async_trait]
pub trait Copier: Send + Sync {
	async fn copy(
		&self,
		source: &Path,
		destination: &Path,
		options: &CopyOptions<'_>,
	) -> Result<(), TransferError>;
}

/// `Copier` driving `rsync` over SSH
#[derive(Debug, Clone)]
pub struct RsyncCopier {
	session: SshSession,
	program: PathBuf,
}

impl RsyncCopier {
	pub fn new(session: SshSession) -> Self {
		RsyncCopier { session, program: PathBuf::from("rsync") }
	}

	/// Build the rsync argument list for one transfer.
	///
	/// Paths are passed as raw bytes; `--protect-args` keeps the remote shell
	/// from splitting or mangling the destination.
	pub fn args(&self, source: &Path, destination: &Path, options: &CopyOptions<'_>) -> Vec<OsString> {
		let ssh_cmd = std::iter::once("ssh".to_string())
			.chain(self.session.ssh_options().iter().map(|o| shell_quote(o)))
			.collect::<Vec<_>>()
			.join(" ");

		let mut args: Vec<OsString> = [
			"-e",
			ssh_cmd.as_str(),
			"--protect-args",
			"-lptgoD",
			"--numeric-ids",
			"--delete",
			"--delete-excluded",
			if options.recursive { "--recursive" } else { "--dirs" },
		]
		.iter()
		.map(OsString::from)
		.collect();
		if let Some(reference) = options.dedup_reference {
			let mut arg = OsString::from("--link-dest=");
			arg.push(reference);
			args.push(arg);
		}
		args.extend(options.exclude.iter().map(|e| OsString::from(format!("--exclude={}", e))));
		if options.verbose {
			args.push(OsString::from("-v"));
		}
		args.push(with_trailing_slash(source));

		let mut remote = OsString::from(format!("{}:", self.session.connection_str()));
		remote.push(with_trailing_slash(destination));
		args.push(remote);
		args
	}
}

fn with_trailing_slash(path: &Path) -> OsString {
	let mut s = path.as_os_str().to_os_string();
	if !s.as_bytes().ends_with(b"/") {
		s.push("/");
	}
	s
}

#[async_trait]
impl Copier for RsyncCopier {
	async fn copy(
		&self,
		source: &Path,
		destination: &Path,
		options: &CopyOptions<'_>,
	) -> Result<(), TransferError> {
		let args = self.args(source, destination, options);
		debug!(
			"Run rsync {}",
			args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
		);

		let output = Command::new(&self.program)
			.args(&args)
			.stdin(Stdio::null())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|e| TransferError::SpawnFailed {
				cmd: self.program.display().to_string(),
				source: e,
			})?;

		if options.verbose {
			for line in String::from_utf8_lossy(&output.stdout).lines() {
				debug!("rsync: {}", line);
			}
		}

		if !output.status.success() {
			return Err(TransferError::CopyFailed {
				source_path: source.to_path_buf(),
				code: output.status.code(),
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}
		Ok(())
	}
}


// vim: ts=4
