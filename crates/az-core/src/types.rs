//! Shared domain types used across azedarach crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a bead (e.g., `az-1a2b`).
pub type BeadId = String;

/// Timestamp type used throughout azedarach.
pub type Timestamp = DateTime<Utc>;

/// Get the current UTC timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Bead status, one per board column.
///
/// The middle "blocking" column is canonically named `Review`; the store
/// adapter also accepts `blocked` from older databases and maps it here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    /// Ready to be worked on
    #[default]
    Open,
    /// Currently being worked on
    InProgress,
    /// Waiting on review (or blocked, in older databases)
    #[serde(alias = "blocked")]
    Review,
    /// Completed
    Done,
}

impl BeadStatus {
    /// Board column index for this status (injective).
    pub fn column(&self) -> usize {
        match self {
            Self::Open => 0,
            Self::InProgress => 1,
            Self::Review => 2,
            Self::Done => 3,
        }
    }

    /// Status for a board column index, if the index is in range.
    pub fn from_column(column: usize) -> Option<Self> {
        match column {
            0 => Some(Self::Open),
            1 => Some(Self::InProgress),
            2 => Some(Self::Review),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    /// All statuses in column order.
    pub fn all() -> [Self; 4] {
        [Self::Open, Self::InProgress, Self::Review, Self::Done]
    }

    /// The wire name `bd` expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for BeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bead priority levels (P0 = critical, P4 = backlog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    /// Critical (P0) - must be done immediately
    P0,
    /// High (P1)
    P1,
    /// Normal (P2)
    #[default]
    P2,
    /// Low (P3)
    P3,
    /// Backlog (P4)
    P4,
}

impl Priority {
    /// Numeric value as used by `bd` (0 highest).
    pub fn value(&self) -> u8 {
        match self {
            Self::P0 => 0,
            Self::P1 => 1,
            Self::P2 => 2,
            Self::P3 => 3,
            Self::P4 => 4,
        }
    }

    /// All priorities, highest first.
    pub fn all() -> [Self; 5] {
        [Self::P0, Self::P1, Self::P2, Self::P3, Self::P4]
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.value()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::P0),
            1 => Ok(Self::P1),
            2 => Ok(Self::P2),
            3 => Ok(Self::P3),
            4 => Ok(Self::P4),
            other => Err(format!("priority out of range: {other}")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.value())
    }
}

/// Type of bead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Generic task
    #[default]
    Task,
    /// Bug fix
    Bug,
    /// New feature
    Feature,
    /// Epic (collection of related beads)
    Epic,
    /// Maintenance chore
    Chore,
}

impl IssueType {
    /// The wire name `bd` expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
        }
    }

    /// All issue types.
    pub fn all() -> [Self; 5] {
        [Self::Task, Self::Bug, Self::Feature, Self::Epic, Self::Chore]
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of an AI assistant session bound to a bead.
///
/// A missing table entry is equivalent to [`SessionState::Idle`]. `Idle`
/// implies no multiplexer session and no worktree; every other state implies
/// both exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session running
    #[default]
    Idle,
    /// Assistant is actively working
    Busy,
    /// Assistant is waiting for user input
    Waiting,
    /// Session suspended by the user
    Paused,
    /// Assistant reported completion
    Done,
    /// Assistant reported a failure
    Error,
}

impl SessionState {
    /// Returns true if a multiplexer session and worktree exist in this state.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Sort weight for the Session sort field. Higher sorts first.
    pub fn sort_weight(&self) -> u8 {
        match self {
            Self::Waiting => 6,
            Self::Busy => 5,
            Self::Paused => 4,
            Self::Error => 3,
            Self::Done => 2,
            Self::Idle => 1,
        }
    }

    /// Single-glyph indicator for board cards.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Idle => " ",
            Self::Busy => "●",
            Self::Waiting => "◐",
            Self::Paused => "⏸",
            Self::Done => "✓",
            Self::Error => "✗",
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Busy => "Busy",
            Self::Waiting => "Waiting",
            Self::Paused => "Paused",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a named dev server bound to a bead's worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevServerStatus {
    /// Not running
    #[default]
    Stopped,
    /// Session created, server booting
    Starting,
    /// Server up
    Running,
    /// Server exited abnormally
    Error,
}

impl DevServerStatus {
    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for DevServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_column_injective() {
        let mut seen = std::collections::HashSet::new();
        for status in BeadStatus::all() {
            assert!(seen.insert(status.column()), "duplicate column for {status}");
        }
    }

    #[test]
    fn test_status_column_round_trip() {
        for status in BeadStatus::all() {
            assert_eq!(BeadStatus::from_column(status.column()), Some(status));
        }
        assert_eq!(BeadStatus::from_column(4), None);
    }

    #[test]
    fn test_status_parses_blocked_alias() {
        let status: BeadStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(status, BeadStatus::Review);
        // Always written as review
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"review\"");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::P0 < Priority::P1);
        assert!(Priority::P3 < Priority::P4);
    }

    #[test]
    fn test_priority_serde_numeric() {
        let p: Priority = serde_json::from_str("3").unwrap();
        assert_eq!(p, Priority::P3);
        assert_eq!(serde_json::to_string(&Priority::P0).unwrap(), "0");
        assert!(serde_json::from_str::<Priority>("7").is_err());
    }

    #[test]
    fn test_session_sort_weights() {
        assert!(SessionState::Waiting.sort_weight() > SessionState::Busy.sort_weight());
        assert!(SessionState::Busy.sort_weight() > SessionState::Paused.sort_weight());
        assert!(SessionState::Paused.sort_weight() > SessionState::Error.sort_weight());
        assert!(SessionState::Error.sort_weight() > SessionState::Done.sort_weight());
        assert!(SessionState::Done.sort_weight() > SessionState::Idle.sort_weight());
    }

    #[test]
    fn test_idle_is_not_active() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Paused.is_active());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(BeadStatus::InProgress.to_string(), "in_progress");
        assert_eq!(Priority::P0.to_string(), "P0");
        assert_eq!(IssueType::Chore.to_string(), "chore");
        assert_eq!(DevServerStatus::Running.to_string(), "Running");
    }
}
