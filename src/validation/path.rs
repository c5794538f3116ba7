//! Path checks for roots and generation-relative destinations

use std::path::{Component, Path};

use super::ValidationError;

/// True if `path` has no `..` component
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Validate a remote or source root: absolute and without `..`
pub fn validate_root(what: &str, path: &Path) -> Result<(), ValidationError> {
	if !path.is_absolute() {
		return Err(ValidationError::InvalidPath(format!(
			"{} {:?} must be an absolute path",
			what, path
		)));
	}
	if !is_path_safe(path) {
		return Err(ValidationError::InvalidPath(format!(
			"{} {:?} contains a parent directory reference (..)",
			what, path
		)));
	}
	Ok(())
}

/// Validate a path below a generation root: relative and without `..`
pub fn validate_destination(path: &Path) -> Result<(), ValidationError> {
	if path.is_absolute() {
		return Err(ValidationError::InvalidPath(format!(
			"destination {:?} must be relative to the generation root",
			path
		)));
	}
	if !is_path_safe(path) {
		return Err(ValidationError::InvalidPath(format!(
			"destination {:?} contains a parent directory reference (..)",
			path
		)));
	}
	Ok(())
}


// vim: ts=4
