//! Utility modules for common functionality

pub mod lock;
pub mod paths;

pub use lock::{wait_for_shutdown, RunLock};
pub use paths::{expand_user, relative_path};

// vim: ts=4
