use clap::{Arg, ArgAction, ArgMatches, Command};
use nix::unistd::geteuid;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use rotasync::config::{Config, DEFAULT_CONFIG_PATH};
use rotasync::coordinator::BackupCoordinator;
use rotasync::copier::RsyncCopier;
use rotasync::error::BackupError;
use rotasync::logging::init_tracing;
use rotasync::mirror::{MirrorOutcome, MirrorRotator};
use rotasync::progress::{progress_path, ProgressStore};
use rotasync::remote::{SshExecutor, SshSession};
use rotasync::rotation::RotationManager;
use rotasync::types::RotationGroup;
use rotasync::utils::{wait_for_shutdown, RunLock};
use rotasync::walker::FsLister;

fn cli() -> Command {
	let group_arg = || Arg::new("group").help("Rotation group (default: default_group from the config)");

	Command::new("rotasync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Rotating, resumable backups to a remote host via rsync")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.default_value(DEFAULT_CONFIG_PATH)
				.global(true)
				.help("Config file"),
		)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.action(ArgAction::Count)
				.global(true)
				.help("More output (-vvv also makes rsync verbose)"),
		)
		.arg(
			Arg::new("quiet")
				.short('q')
				.long("quiet")
				.action(ArgAction::SetTrue)
				.global(true)
				.help("Output only warnings"),
		)
		.subcommand(
			Command::new("backup").about("Back up a rotation group").arg(group_arg()).arg(
				Arg::new("new")
					.long("new")
					.action(ArgAction::SetTrue)
					.help("Start a new generation even if the previous attempt is unfinished"),
			),
		)
		.subcommand(
			Command::new("status").about("Show progress of the current attempt").arg(group_arg()).arg(
				Arg::new("json").long("json").action(ArgAction::SetTrue).help("Machine-readable output"),
			),
		)
		.subcommand(Command::new("generations").about("List generations on the remote store").arg(group_arg()))
		.subcommand(
			Command::new("rotate")
				.about("Snapshot mirrors kept current on the store by other clients")
				.arg(Arg::new("mirror").help("Mirror to rotate (default: every configured mirror)")),
		)
		.subcommand(
			Command::new("reset")
				.about("Forget the progress of the current attempt")
				.arg(group_arg()),
		)
}

#[derive(Serialize)]
struct Status<'a> {
	group: &'a str,
	record: PathBuf,
	exists: bool,
	done: bool,
	rotating: bool,
	completed_units: Vec<&'a str>,
}

fn load_group(config: &Config, matches: &ArgMatches) -> Result<RotationGroup, Box<dyn Error>> {
	let name = config.group_name(matches.get_one::<String>("group").map(String::as_str))?;
	Ok(config.group(name)?)
}

fn check_privileges(group: &RotationGroup) -> Result<(), BackupError> {
	if group.needs_root() && !geteuid().is_root() {
		return Err(BackupError::PermissionDenied {
			message: format!("group {} requires root permissions", group.name),
		});
	}
	Ok(())
}

async fn backup(config: &Config, group: &RotationGroup, force_new: bool, verbose: u8) -> Result<bool, Box<dyn Error>> {
	check_privileges(group)?;
	let session = SshSession::resolve(&config.remote_target()?).await?;
	let executor = SshExecutor::new(session.clone());
	let copier = RsyncCopier::new(session);

	let report = BackupCoordinator::new(&executor, &copier, &FsLister, config.state_dir())
		.verbose_transfers(verbose >= 3)
		.run(group, force_new)
		.await?;

	for location in &report.locations {
		for failure in &location.walk.failures {
			warn!("{}: {} not backed up: {}", location.name, failure.path.display(), failure.error);
		}
	}
	Ok(report.is_complete())
}

async fn status(config: &Config, group: &RotationGroup, json: bool) -> Result<(), Box<dyn Error>> {
	let store = ProgressStore::open(progress_path(&config.state_dir(), &group.name)).await?;
	let status = Status {
		group: &group.name,
		record: store.path().to_path_buf(),
		exists: store.exists(),
		done: store.is_done(),
		rotating: store.is_rotating(),
		completed_units: store.units().collect(),
	};

	if json {
		println!("{}", serde_json::to_string_pretty(&status)?);
		return Ok(());
	}

	let state = if !status.exists {
		"no attempt recorded, next backup starts a new generation"
	} else if status.done {
		"last attempt finished, next backup starts a new generation"
	} else if status.rotating {
		"rotation was interrupted, inspect the remote store"
	} else {
		"attempt in progress, next backup resumes it"
	};
	println!("{}: {}", status.group, state);
	println!("  record: {}", status.record.display());
	println!("  completed directories: {}", status.completed_units.len());
	Ok(())
}

async fn generations(config: &Config, group: &RotationGroup) -> Result<(), Box<dyn Error>> {
	let session = SshSession::resolve(&config.remote_target()?).await?;
	let executor = SshExecutor::new(session);
	let slots = RotationManager::new(&executor).list_slots(&group.remote_root, &group.prefix).await?;
	if slots.is_empty() {
		println!("{}: no generations in {}", group.name, group.remote_root.display());
	}
	for slot in slots {
		let marker = if slot > group.retain { "  (beyond retention)" } else { "" };
		println!("{}{}", group.generation_path(slot).display(), marker);
	}
	Ok(())
}

/// Rotate the named mirror, or every mirror. False if any of them failed.
async fn rotate(config: &Config, name: Option<&str>) -> Result<bool, Box<dyn Error>> {
	let names: Vec<&str> = match name {
		Some(name) => vec![name],
		None => config.mirror_names().collect(),
	};
	if names.is_empty() {
		warn!("No mirrors configured");
		return Ok(true);
	}
	let mirrors = names.into_iter().map(|name| config.mirror(name)).collect::<Result<Vec<_>, _>>()?;

	let session = SshSession::resolve(&config.remote_target()?).await?;
	let executor = SshExecutor::new(session);
	let state_dir = config.state_dir();
	let rotator = MirrorRotator::new(&executor, &state_dir);

	let mut ok = true;
	for mirror in &mirrors {
		match rotator.run(mirror).await {
			Ok(MirrorOutcome::Unchanged) => {}
			Ok(MirrorOutcome::Rotated { .. }) => info!("New generation {}", mirror.generation_path(0).display()),
			Err(e) => {
				warn!("Mirror {} failed: {}", mirror.name, e);
				ok = false;
			}
		}
	}
	Ok(ok)
}

async fn reset(config: &Config, group: &RotationGroup) -> Result<(), Box<dyn Error>> {
	let state_dir = config.state_dir();
	let _lock = RunLock::acquire(&state_dir, &group.name).await?;
	let mut store = ProgressStore::open(progress_path(&state_dir, &group.name)).await?;
	store.reset().await?;
	info!("Progress of {} cleared", group.name);
	Ok(())
}

async fn run(matches: &ArgMatches) -> Result<ExitCode, Box<dyn Error>> {
	let config_path = matches.get_one::<String>("config").map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);
	let config = Config::load(Path::new(config_path))?;
	let verbose = matches.get_count("verbose");
	init_tracing(verbose, matches.get_flag("quiet"), config.logfile().as_deref())?;

	match matches.subcommand() {
		Some(("backup", sub)) => {
			let group = load_group(&config, sub)?;
			let complete = backup(&config, &group, sub.get_flag("new"), verbose).await?;
			Ok(if complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
		}
		Some(("status", sub)) => {
			status(&config, &load_group(&config, sub)?, sub.get_flag("json")).await?;
			Ok(ExitCode::SUCCESS)
		}
		Some(("generations", sub)) => {
			generations(&config, &load_group(&config, sub)?).await?;
			Ok(ExitCode::SUCCESS)
		}
		Some(("rotate", sub)) => {
			let ok = rotate(&config, sub.get_one::<String>("mirror").map(String::as_str)).await?;
			Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
		}
		Some(("reset", sub)) => {
			reset(&config, &load_group(&config, sub)?).await?;
			Ok(ExitCode::SUCCESS)
		}
		_ => Ok(ExitCode::FAILURE),
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	let matches = cli().get_matches();

	tokio::select! {
		result = run(&matches) => match result {
			Ok(code) => code,
			Err(e) => {
				eprintln!("rotasync: {}", e);
				ExitCode::FAILURE
			}
		},
		code = wait_for_shutdown() => {
			// Dropping the run kills rsync/ssh children and releases the lock
			warn!("Interrupted; completed directories are recorded, run again to resume");
			ExitCode::from(code as u8)
		}
	}
}


// vim: ts=4
