//! Multiplexer session naming.
//!
//! Session names are the global lock: "session name exists" means the
//! corresponding process is running. Every name is derived here so the
//! mapping stays deterministic.

use az_core::types::BeadId;

/// Session-name factory carrying the configured assistant prefix.
#[derive(Debug, Clone)]
pub struct SessionNames {
    prefix: String,
}

impl Default for SessionNames {
    fn default() -> Self {
        Self { prefix: "ai-".into() }
    }
}

impl SessionNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: if prefix.is_empty() { "ai-".into() } else { prefix },
        }
    }

    /// Assistant session for a bead: `<prefix><bead-id>`.
    pub fn assistant(&self, bead: &BeadId) -> String {
        format!("{}{bead}", self.prefix)
    }

    /// Chat session for a bead: `chat-<bead-id>`.
    pub fn chat(&self, bead: &BeadId) -> String {
        format!("chat-{bead}")
    }

    /// Dev server session: `dev-<bead-id>-<server>`.
    pub fn dev_server(&self, bead: &BeadId, server: &str) -> String {
        format!("dev-{bead}-{server}")
    }

    /// The planning session: `<prefix>planning`.
    pub fn planning(&self) -> String {
        format!("{}planning", self.prefix)
    }
}

/// Quote a string for safe interpolation into a shell command line.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}
