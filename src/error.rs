//! Error types for rotasync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for a backup run
#[derive(Debug)]
pub enum BackupError {
	/// Remote command channel failed
	Transport(TransportError),

	/// The rotation step failed; remote slots need manual inspection
	Rotation { group: String, source: TransportError },

	/// A previous run died between starting and finishing the rotation step
	RotationInterrupted { group: String },

	/// Invalid or missing configuration
	Config(ConfigError),

	/// Progress record could not be read or written
	Progress(ProgressError),

	/// Privilege requirement not met
	PermissionDenied { message: String },

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for BackupError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackupError::Transport(e) => write!(f, "Transport error: {}", e),
			BackupError::Rotation { group, source } => write!(
				f,
				"Rotation of {} failed, inspect the remote generations before retrying: {}",
				group, source
			),
			BackupError::RotationInterrupted { group } => write!(
				f,
				"A previous rotation of {} did not complete; inspect the remote generations, then rerun with --new",
				group
			),
			BackupError::Config(e) => write!(f, "{}", e),
			BackupError::Progress(e) => write!(f, "Progress error: {}", e),
			BackupError::PermissionDenied { message } => {
				write!(f, "Permission denied: {}", message)
			}
			BackupError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for BackupError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			BackupError::Transport(e) => Some(e),
			BackupError::Rotation { source, .. } => Some(source),
			BackupError::Config(e) => Some(e),
			BackupError::Progress(e) => Some(e),
			BackupError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for BackupError {
	fn from(e: io::Error) -> Self {
		BackupError::Io(e)
	}
}

impl From<TransportError> for BackupError {
	fn from(e: TransportError) -> Self {
		BackupError::Transport(e)
	}
}

impl From<ConfigError> for BackupError {
	fn from(e: ConfigError) -> Self {
		BackupError::Config(e)
	}
}

impl From<ProgressError> for BackupError {
	fn from(e: ProgressError) -> Self {
		BackupError::Progress(e)
	}
}

/// Remote command errors
#[derive(Debug)]
pub enum TransportError {
	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// Remote command exited with non-zero status
	CommandFailed { command: String, code: Option<i32>, stderr: String },

	/// Host discovery script failed or printed nothing
	HostLookup { script: String, message: String },

	/// Remote output was not valid UTF-8
	InvalidOutput { command: String },
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			TransportError::CommandFailed { command, code, stderr } => {
				match code {
					Some(code) => write!(f, "'{}' exited with status {}", command, code)?,
					None => write!(f, "'{}' was terminated by a signal", command)?,
				}
				if !stderr.trim().is_empty() {
					write!(f, ": {}", stderr.trim())?;
				}
				Ok(())
			}
			TransportError::HostLookup { script, message } => {
				write!(f, "Host lookup with '{}' failed: {}", script, message)
			}
			TransportError::InvalidOutput { command } => {
				write!(f, "'{}' produced non UTF-8 output", command)
			}
		}
	}
}

impl Error for TransportError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			TransportError::SpawnFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Failure of a single transfer unit. Never fatal for the walk.
#[derive(Debug)]
pub enum TransferError {
	/// Copy tool could not be started
	SpawnFailed { cmd: String, source: io::Error },

	/// Copy tool reported failure
	CopyFailed { source_path: PathBuf, code: Option<i32>, stderr: String },

	/// Source directory could not be listed
	ListFailed { path: PathBuf, source: io::Error },
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			TransferError::CopyFailed { source_path, code, stderr } => {
				write!(f, "Copy of {} failed", source_path.display())?;
				if let Some(code) = code {
					write!(f, " with status {}", code)?;
				}
				if !stderr.trim().is_empty() {
					write!(f, ": {}", stderr.trim())?;
				}
				Ok(())
			}
			TransferError::ListFailed { path, source } => {
				write!(f, "Cannot list {}: {}", path.display(), source)
			}
		}
	}
}

impl Error for TransferError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			TransferError::SpawnFailed { source, .. } => Some(source),
			TransferError::ListFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Configuration errors, raised before any remote mutation
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	ReadFailed { path: PathBuf, source: io::Error },

	/// Config file could not be parsed
	ParseFailed { path: PathBuf, message: String },

	/// Required setting is missing
	Missing { key: String, section: String },

	/// Group name not present in the config
	UnknownGroup { name: String },

	/// Mirror name not present in the config
	UnknownMirror { name: String },

	/// Setting has an unusable value
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::ReadFailed { path, source } => {
				write!(f, "Could not read config file {}: {}", path.display(), source)
			}
			ConfigError::ParseFailed { path, message } => {
				write!(f, "Could not parse config file {}: {}", path.display(), message)
			}
			ConfigError::Missing { key, section } => {
				write!(f, "Missing required setting '{}' in [{}]", key, section)
			}
			ConfigError::UnknownGroup { name } => write!(f, "Unknown rotation group '{}'", name),
			ConfigError::UnknownMirror { name } => write!(f, "Unknown mirror '{}'", name),
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConfigError::ReadFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Progress record errors
#[derive(Debug)]
pub enum ProgressError {
	/// Failed to load the record
	LoadFailed { path: PathBuf, source: io::Error },

	/// Failed to save the record
	SaveFailed { path: PathBuf, source: io::Error },

	/// Another run holds the lock
	LockFailed { message: String },

	/// Unit identifier cannot be stored
	InvalidUnit { unit: String },
}

impl fmt::Display for ProgressError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProgressError::LoadFailed { path, source } => {
				write!(f, "Failed to load {}: {}", path.display(), source)
			}
			ProgressError::SaveFailed { path, source } => {
				write!(f, "Failed to save {}: {}", path.display(), source)
			}
			ProgressError::LockFailed { message } => write!(f, "Lock failed: {}", message),
			ProgressError::InvalidUnit { unit } => {
				write!(f, "Unit identifier {:?} cannot be recorded", unit)
			}
		}
	}
}

impl Error for ProgressError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ProgressError::LoadFailed { source, .. } => Some(source),
			ProgressError::SaveFailed { source, .. } => Some(source),
			_ => None,
		}
	}
}


// vim: ts=4
