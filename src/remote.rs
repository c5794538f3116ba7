//! Remote command execution over SSH

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::types::{HostSource, RemoteTarget};

/// One element of a remote command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	Word(String),
	/// Shell `&&`: run the next command only if the previous one succeeded
	And,
}

/// Command line for the remote shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
	tokens: Vec<Token>,
}

impl RemoteCommand {
	pub fn new(program: impl Into<String>) -> Self {
		RemoteCommand { tokens: vec![Token::Word(program.into())] }
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.tokens.push(Token::Word(arg.into()));
		self
	}

	pub fn path_arg(self, path: &Path) -> Self {
		self.arg(path.to_string_lossy().into_owned())
	}

	/// Chain `next` so it only runs if everything before it succeeded
	pub fn and_then(mut self, next: RemoteCommand) -> Self {
		self.tokens.push(Token::And);
		self.tokens.extend(next.tokens);
		self
	}

	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Chained commands, each as its list of words
	pub fn commands(&self) -> Vec<Vec<&str>> {
		let mut commands = vec![Vec::new()];
		for token in &self.tokens {
			match token {
				Token::Word(w) => {
					if let Some(last) = commands.last_mut() {
						last.push(w.as_str());
					}
				}
				Token::And => commands.push(Vec::new()),
			}
		}
		commands
	}

	/// Render for the remote shell, quoting every word
	pub fn render(&self) -> String {
		let parts: Vec<String> = self
			.tokens
			.iter()
			.map(|t| match t {
				Token::Word(w) => shell_quote(w),
				Token::And => "&&".to_string(),
			})
			.collect();
		parts.join(" ")
	}

	pub fn mkdir_p(path: &Path) -> Self {
		RemoteCommand::new("mkdir").arg("-p").path_arg(path)
	}

	pub fn list(path: &Path) -> Self {
		RemoteCommand::new("ls").arg("-1").path_arg(path)
	}

	pub fn remove_tree(path: &Path) -> Self {
		RemoteCommand::new("rm").arg("-rf").path_arg(path)
	}

	pub fn rename(from: &Path, to: &Path) -> Self {
		RemoteCommand::new("mv").path_arg(from).path_arg(to)
	}
}

impl fmt::Display for RemoteCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.render())
	}
}

/// Quote a word for a POSIX shell; plain words are left as they are
pub fn shell_quote(word: &str) -> String {
	let plain = !word.is_empty()
		&& word.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
	if plain {
		word.to_string()
	} else {
		format!("'{}'", word.replace('\'', r"'\''"))
	}
}

/// Runs commands on the backup store
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
	/// Run `command` and return its stdout. Non-zero exit is an error.
	async fn run(&self, command: &RemoteCommand) -> Result<String, TransportError>;
}

/// Resolved SSH endpoint shared by the executor and the copier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSession {
	pub username: String,
	pub host: String,
	pub port: u16,
	pub identity_file: Option<PathBuf>,
}

impl SshSession {
	/// Resolve the host, running the discovery script if one is configured
	pub async fn resolve(target: &RemoteTarget) -> Result<Self, TransportError> {
		let host = match &target.host {
			HostSource::Fixed(host) => host.clone(),
			HostSource::Script(script) => {
				debug!("Retrieve host with {}", script);
				let output = Command::new("sh")
					.arg("-c")
					.arg(script)
					.stdin(Stdio::null())
					.kill_on_drop(true)
					.output()
					.await
					.map_err(|e| TransportError::SpawnFailed { cmd: script.clone(), source: e })?;
				if !output.status.success() {
					return Err(TransportError::HostLookup {
						script: script.clone(),
						message: format!(
							"exited with {}: {}",
							output.status,
							String::from_utf8_lossy(&output.stderr).trim()
						),
					});
				}
				let host = String::from_utf8_lossy(&output.stdout).trim().to_string();
				if host.is_empty() {
					return Err(TransportError::HostLookup {
						script: script.clone(),
						message: "printed no address".to_string(),
					});
				}
				info!("Found backup device at {}", host);
				host
			}
		};

		Ok(SshSession {
			username: target.username.clone(),
			host,
			port: target.port,
			identity_file: target.identity_file.clone(),
		})
	}

	/// `user@host`
	pub fn connection_str(&self) -> String {
		format!("{}@{}", self.username, self.host)
	}

	/// SSH options selecting port and identity
	pub fn ssh_options(&self) -> Vec<String> {
		let mut opts = vec!["-p".to_string(), self.port.to_string()];
		if let Some(identity) = &self.identity_file {
			opts.push("-i".to_string());
			opts.push(identity.to_string_lossy().into_owned());
		}
		opts
	}
}

/// `RemoteExecutor` running commands through the `ssh` client
#[derive(Debug, Clone)]
pub struct SshExecutor {
	session: SshSession,
}

impl SshExecutor {
	pub fn new(session: SshSession) -> Self {
		SshExecutor { session }
	}

	pub fn session(&self) -> &SshSession {
		&self.session
	}
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
	async fn run(&self, command: &RemoteCommand) -> Result<String, TransportError> {
		let rendered = command.render();
		debug!("Connect to {}:{} and run {}", self.session.connection_str(), self.session.port, rendered);

		let output = Command::new("ssh")
			.args(self.session.ssh_options())
			.arg(self.session.connection_str())
			.arg(&rendered)
			.stdin(Stdio::null())
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|e| TransportError::SpawnFailed { cmd: "ssh".to_string(), source: e })?;

		if !output.status.success() {
			return Err(TransportError::CommandFailed {
				command: rendered,
				code: output.status.code(),
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}

		String::from_utf8(output.stdout).map_err(|_| TransportError::InvalidOutput { command: rendered })
	}
}


// vim: ts=4
