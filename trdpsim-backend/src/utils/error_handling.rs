//! Best-effort cleanup helpers.
//!
//! Cleanup that runs after an operation has already failed must never replace
//! the original error; these helpers log the secondary failure instead.

use std::fmt::Display;

use tracing::warn;

/// Log a failed cleanup step and discard its error
pub fn log_cleanup_failure<T, E: Display>(result: Result<T, E>, operation: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Cleanup step '{}' failed: {}", operation, err);
            None
        }
    }
}

/// Remove a file, ignoring a file that is already gone
pub fn remove_file_quietly(path: &std::path::Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove '{}': {}", path.display(), err);
        }
    }
}
