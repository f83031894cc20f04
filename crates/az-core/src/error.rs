//! Error types for azedarach operations.
//!
//! This module defines [`AzError`], the error enum shared across the
//! workspace. Errors are designed for visibility: background tasks classify
//! every failure into one of these variants and surface it as a toast, never
//! a panic. Only startup-time errors abort the process.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`AzError`].
pub type Result<T> = std::result::Result<T, AzError>;

/// Toast severity associated with an error when it reaches the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Error type shared by all azedarach crates.
#[derive(Debug, Error)]
pub enum AzError {
    // =========================================================================
    // User-input / state errors
    // =========================================================================
    /// Input rejected before any external call was made
    #[error("{message}")]
    Validation { message: String },

    /// A referenced entity does not exist
    #[error("{what} not found: {id}")]
    NotFound { what: String, id: String },

    /// The per-task command queue already has a running entry
    #[error("{id} is busy ({label} in progress)")]
    Busy { id: String, label: String },

    // =========================================================================
    // External collaborator errors
    // =========================================================================
    /// An external command (`bd`, `git`, `tmux`, ...) exited non-zero
    #[error("{program} failed: {message}")]
    CommandFailed { program: String, message: String },

    /// External command binary could not be spawned at all
    #[error("{program} unavailable: {message}")]
    BackendUnavailable { program: String, message: String },

    /// A merge probe reported conflicting files
    #[error("merge conflicts in {} file(s)", files.len())]
    MergeConflict { files: Vec<String> },

    /// An external command exceeded its time budget
    #[error("{program} timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    /// The operation was cancelled before completion
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// A multiplexer session already exists under the requested name
    #[error("session already exists: {name}")]
    SessionExists { name: String },

    // =========================================================================
    // Configuration / registry errors (fatal at startup)
    // =========================================================================
    /// Configuration file could not be parsed
    #[error("invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration file is from a future version
    #[error("configuration at {path} has version {version}, expected <= {supported}")]
    ConfigFutureVersion {
        path: PathBuf,
        version: u32,
        supported: u32,
    },

    /// Project registry is missing or corrupt
    #[error("project registry error: {message}")]
    Registry { message: String },

    /// A registered project path is not a git working directory
    #[error("not a git repository: {path}")]
    NotARepository { path: PathBuf },

    // =========================================================================
    // Infrastructure errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Terminal initialization failed
    #[error("terminal initialization failed: {message}")]
    TerminalInit { message: String },

    /// Internal error (bug in azedarach)
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AzError {
    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            id: id.into(),
        }
    }

    /// Create a Busy error naming the running queue label.
    pub fn busy(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Busy {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Create a CommandFailed error from a program name and stderr excerpt.
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            program: program.into(),
            message: excerpt(&message.into()),
        }
    }

    /// Create a BackendUnavailable error (binary missing, spawn failed).
    pub fn unavailable(program: impl Into<String>, source: &std::io::Error) -> Self {
        Self::BackendUnavailable {
            program: program.into(),
            message: source.to_string(),
        }
    }

    /// Create an I/O error.
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error should abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigFutureVersion { .. }
                | Self::Registry { .. }
                | Self::TerminalInit { .. }
        )
    }

    /// Returns true if a busy queue caused the refusal.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Toast severity when this error is surfaced to the UI.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Validation { .. } | Self::Busy { .. } => Severity::Warning,
            Self::NotFound { .. } => Severity::Warning,
            Self::Cancelled { .. } => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Toast display duration in seconds, per severity.
    pub fn toast_secs(&self) -> u64 {
        match self.severity() {
            Severity::Error => 8,
            _ => 5,
        }
    }
}

/// Trim a stderr blob down to a single-line excerpt suitable for a toast.
fn excerpt(stderr: &str) -> String {
    let line = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.chars().count() > 120 {
        let mut out: String = line.chars().take(117).collect();
        out.push_str("...");
        out
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message_names_label() {
        let err = AzError::busy("az-1", "start");
        assert_eq!(err.to_string(), "az-1 is busy (start in progress)");
        assert!(err.is_busy());
        assert_eq!(err.severity(), Severity::Warning);
    }

    #[test]
    fn test_command_failed_excerpt() {
        let err = AzError::command("git", "\n\nfatal: not a git repository\nmore context\n");
        assert_eq!(err.to_string(), "git failed: fatal: not a git repository");
    }

    #[test]
    fn test_excerpt_truncates_long_lines() {
        let long = "x".repeat(300);
        let trimmed = excerpt(&long);
        assert_eq!(trimmed.len(), 120);
        assert!(trimmed.ends_with("..."));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(
            AzError::ConfigFutureVersion {
                path: "/p/.azedarach.json".into(),
                version: 9,
                supported: 1,
            }
            .is_fatal()
        );
        assert!(!AzError::validation("no selection").is_fatal());
        assert!(!AzError::command("bd", "boom").is_fatal());
    }

    #[test]
    fn test_toast_durations() {
        assert_eq!(AzError::command("bd", "boom").toast_secs(), 8);
        assert_eq!(AzError::validation("bad input").toast_secs(), 5);
    }

    #[test]
    fn test_merge_conflict_counts_files() {
        let err = AzError::MergeConflict {
            files: vec!["src/a.txt".into(), "src/b.txt".into()],
        };
        assert_eq!(err.to_string(), "merge conflicts in 2 file(s)");
    }
}
