//! Checks run on resolved groups and remote targets before any remote
//! command is issued

use std::error::Error;
use std::fmt;

use crate::error::ConfigError;

pub mod config;
pub mod path;

pub use path::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	InvalidSetting(String),
	InvalidPath(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::InvalidSetting(msg) => f.write_str(msg),
			ValidationError::InvalidPath(msg) => write!(f, "bad path: {}", msg),
		}
	}
}

impl Error for ValidationError {}

impl From<ValidationError> for ConfigError {
	fn from(e: ValidationError) -> Self {
		ConfigError::Invalid { message: e.to_string() }
	}
}

/// Implemented by resolved settings that can be checked on their own
pub trait Validator {
	fn validate(&self) -> Result<(), ValidationError>;
}


// vim: ts=4
