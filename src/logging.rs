//! Logging setup.
//!
//! Console output goes to stderr and is filtered by `RUST_LOG` when set,
//! otherwise by the verbosity flags:
//!
//! ```bash
//! rotasync backup            # info
//! rotasync -q backup         # warnings only
//! rotasync -v backup         # debug
//! RUST_LOG=rotasync::walker=trace rotasync backup
//! ```
//!
//! A log file, when configured, always receives debug output without colors.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Console level for the given `-v` count and `-q` flag
pub fn console_level(verbose: u8, quiet: bool) -> LevelFilter {
	match (quiet, verbose) {
		(true, 0) => LevelFilter::WARN,
		(_, 0) => LevelFilter::INFO,
		(_, 1) => LevelFilter::DEBUG,
		_ => LevelFilter::TRACE,
	}
}

/// Initialize the tracing subscriber.
///
/// Fails if the log file cannot be opened.
pub fn init_tracing(verbose: u8, quiet: bool, logfile: Option<&Path>) -> io::Result<()> {
	let console_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::default().add_directive(console_level(verbose, quiet).into()));
	let console = fmt::layer().with_writer(io::stderr).with_target(false).with_filter(console_filter);

	let file_layer = match logfile {
		Some(path) => {
			if let Some(parent) = path.parent() {
				if !parent.as_os_str().is_empty() {
					std::fs::create_dir_all(parent)?;
				}
			}
			let file = OpenOptions::new().create(true).append(true).open(path)?;
			Some(
				fmt::layer()
					.with_ansi(false)
					.with_writer(Mutex::new(file))
					.with_filter(LevelFilter::DEBUG),
			)
		}
		None => None,
	};

	// A second initialization (e.g. from tests) keeps the first subscriber
	let _ = tracing_subscriber::registry().with(console).with(file_layer).try_init();
	Ok(())
}


// vim: ts=4
