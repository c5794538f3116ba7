//! # rotasync - Rotating, resumable backups to a remote store
//!
//! rotasync keeps a bounded history of backup generations
//! (`<prefix>.0` newest ... `<prefix>.<retain-1>` oldest) on a host reachable
//! over SSH. Each run shifts the generations, then fills slot 0 with rsync,
//! hard-linking unchanged files against the previous generation. The transfer
//! is checkpointed per directory, so an interrupted run resumes where it
//! stopped instead of rotating again.
//!
//! A second mode rotates copies that other clients keep current on the
//! store: the snapshot is taken on the store itself whenever the client's
//! completion marker changes (see [`mirror`]).
//!
//! ## Library use
//!
//! ```rust,ignore
//! use rotasync::config::Config;
//! use rotasync::coordinator::BackupCoordinator;
//! use rotasync::copier::RsyncCopier;
//! use rotasync::remote::{SshExecutor, SshSession};
//! use rotasync::walker::FsLister;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("~/.rotasync.toml".as_ref())?;
//!     let group = config.group("daily")?;
//!     let session = SshSession::resolve(&config.remote_target()?).await?;
//!     let executor = SshExecutor::new(session.clone());
//!     let copier = RsyncCopier::new(session);
//!     let report = BackupCoordinator::new(&executor, &copier, &FsLister, config.state_dir())
//!         .run(&group, false)
//!         .await?;
//!     println!("{} failures", report.failure_count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod copier;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod progress;
pub mod remote;
pub mod rotation;
pub mod types;
pub mod utils;
pub mod validation;
pub mod walker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{AttemptMode, BackupCoordinator, BackupReport};
pub use mirror::{MirrorOutcome, MirrorRotator};
pub use error::{BackupError, ConfigError, ProgressError, TransferError, TransportError};
pub use types::{Location, MirrorRotation, RemoteTarget, RotationGroup};

// vim: ts=4
