//! Per-group run lock and termination signals

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::ProgressError;

/// RAII lock guard for exclusive access to one rotation group's state
#[derive(Debug)]
pub struct RunLock {
	path: PathBuf,
}

impl RunLock {
	/// Create `<state_dir>/<group>.lock` holding our PID.
	///
	/// Fails if the lock file already exists.
	pub async fn acquire(state_dir: &Path, group: &str) -> Result<Self, ProgressError> {
		tokio::fs::create_dir_all(state_dir).await.map_err(|e| ProgressError::LockFailed {
			message: format!("Cannot create state directory {}: {}", state_dir.display(), e),
		})?;

		let path = state_dir.join(format!("{}.lock", group));
		let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await
		{
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				return Err(ProgressError::LockFailed {
					message: format!(
						"Backup of {} already in progress (lock file exists). If stale, delete: {}",
						group,
						path.display()
					),
				});
			}
			Err(e) => {
				return Err(ProgressError::LockFailed {
					message: format!("Failed to create lock file {}: {}", path.display(), e),
				});
			}
		};

		// From here on the guard owns the file, so a failed write still cleans up
		let lock = RunLock { path };
		file.write_all(std::process::id().to_string().as_bytes()).await.map_err(|e| {
			ProgressError::LockFailed { message: format!("Failed to write lock file: {}", e) }
		})?;
		debug!("Acquired {}", lock.path.display());
		Ok(lock)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for RunLock {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

/// Resolve when SIGTERM or SIGINT arrives, yielding the conventional exit code.
///
/// If the handlers cannot be installed this never resolves.
pub async fn wait_for_shutdown() -> i32 {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
			return std::future::pending().await;
		}
	};

	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
			return std::future::pending().await;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => {
			debug!("Received SIGTERM");
			143 // 128 + SIGTERM(15)
		}
		_ = sigint.recv() => {
			debug!("Received SIGINT");
			130 // 128 + SIGINT(2)
		}
	}
}


// vim: ts=4
