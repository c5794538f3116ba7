//! Validation of rotation groups and the remote target

use super::{validate_destination, validate_root, ValidationError, Validator};
use crate::types::{HostSource, MirrorRotation, RemoteTarget, RotationGroup};

/// Validate a generation prefix: non-empty, a single path component
pub fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
	if prefix.is_empty() {
		return Err(ValidationError::InvalidSetting("prefix must not be empty".to_string()));
	}
	if prefix.contains('/') || prefix == "." || prefix == ".." {
		return Err(ValidationError::InvalidSetting(format!(
			"prefix {:?} must be a plain directory name",
			prefix
		)));
	}
	Ok(())
}

/// Location names namespace progress units as `<name>:<path>`
pub fn validate_location_name(name: &str) -> Result<(), ValidationError> {
	if name.is_empty() || name.contains(':') || name.contains('\n') {
		return Err(ValidationError::InvalidSetting(format!(
			"location name {:?} must be non-empty and must not contain ':'",
			name
		)));
	}
	Ok(())
}

impl Validator for RotationGroup {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_root("remote_root", &self.remote_root)?;
		validate_prefix(&self.prefix)?;
		if self.locations.is_empty() {
			return Err(ValidationError::InvalidSetting(format!(
				"group {} has no locations",
				self.name
			)));
		}
		for location in &self.locations {
			validate_location_name(&location.name)?;
			validate_root("source", &location.source)?;
			validate_destination(&location.destination)?;
		}
		Ok(())
	}
}

impl Validator for MirrorRotation {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_root("source", &self.source)?;
		validate_root("remote_root", &self.remote_root)?;
		validate_prefix(&self.prefix)?;
		// Rotating one into the other would copy generations into themselves
		if self.source.starts_with(&self.remote_root) || self.remote_root.starts_with(&self.source) {
			return Err(ValidationError::InvalidPath(format!(
				"mirror {}: source {:?} and remote_root {:?} must not contain each other",
				self.name, self.source, self.remote_root
			)));
		}
		Ok(())
	}
}

impl Validator for RemoteTarget {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.username.is_empty() {
			return Err(ValidationError::InvalidSetting("remote username must not be empty".to_string()));
		}
		if self.port == 0 {
			return Err(ValidationError::InvalidSetting("remote port must not be 0".to_string()));
		}
		match &self.host {
			HostSource::Fixed(host) if host.trim().is_empty() => {
				Err(ValidationError::InvalidSetting("remote host must not be empty".to_string()))
			}
			HostSource::Script(script) if script.trim().is_empty() => {
				Err(ValidationError::InvalidSetting("ip_script must not be empty".to_string()))
			}
			_ => Ok(()),
		}
	}
}


// vim: ts=4
