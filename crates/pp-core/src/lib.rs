//! Shared primitives used across Playpen crates.

use core::fmt;

/// Result alias used across the workspace.
pub type PlaypenResult<T> = Result<T, PlaypenError>;

/// Workspace error carrying a stable dotted code and a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaypenError {
    pub code: &'static str,
    pub message: String,
}

impl PlaypenError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true when the error code sits under `prefix` (e.g. `"storage"`).
    pub fn is_in(&self, prefix: &str) -> bool {
        self.code
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
}

impl fmt::Display for PlaypenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PlaypenError {}
