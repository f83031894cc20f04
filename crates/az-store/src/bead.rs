//! The bead entity and its create/update payloads.

use az_core::types::{BeadId, BeadStatus, IssueType, Priority, Timestamp};
use serde::{Deserialize, Serialize};

/// A tracked issue as reported by `bd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    /// Stable identifier (e.g. `az-1a2b`)
    pub id: BeadId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form design notes
    #[serde(default)]
    pub design: Option<String>,
    #[serde(default)]
    pub status: BeadStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub issue_type: IssueType,
    /// Epic this bead belongs to, if any
    #[serde(default)]
    pub parent: Option<BeadId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Bead {
    /// Whether this bead is a child of some epic.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Case-insensitive substring match against title and id.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let q = query.to_lowercase();
        self.title.to_lowercase().contains(&q) || self.id.to_lowercase().contains(&q)
    }

    /// Single-line display form for lists.
    pub fn display(&self) -> String {
        format!("{} [{}] {}", self.id, self.priority, self.title)
    }
}

/// Payload for creating a bead. The id is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeadDraft {
    pub title: String,
    pub description: Option<String>,
    pub issue_type: IssueType,
    pub priority: Priority,
    pub parent: Option<BeadId>,
}

impl BeadDraft {
    /// A draft with just a title and defaults elsewhere.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update: only `Some` fields are sent to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeadPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub design: Option<String>,
    pub status: Option<BeadStatus>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
}

impl BeadPatch {
    /// Patch that only changes the status.
    pub fn status(status: BeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.design.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
    }
}

/// Fixture helpers shared by this workspace's test suites.
#[doc(hidden)]
pub mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Build a bead with fixed timestamps for deterministic tests.
    pub fn bead(id: &str, title: &str, status: BeadStatus) -> Bead {
        let t = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Bead {
            id: id.into(),
            title: title.into(),
            description: None,
            design: None,
            status,
            priority: Priority::P2,
            issue_type: IssueType::Task,
            parent: None,
            created_at: t,
            updated_at: t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::bead;
    use super::*;

    #[test]
    fn test_matches_query_title_and_id() {
        let b = bead("az-12ab", "Fix the Parser", BeadStatus::Open);
        assert!(b.matches_query("parser"));
        assert!(b.matches_query("12AB"));
        assert!(b.matches_query(""));
        assert!(!b.matches_query("renderer"));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(BeadPatch::default().is_empty());
        assert!(!BeadPatch::status(BeadStatus::Done).is_empty());
    }

    #[test]
    fn test_bead_parses_bd_json() {
        let raw = r#"{
            "id": "az-1",
            "title": "T",
            "status": "blocked",
            "priority": 1,
            "issue_type": "bug",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z"
        }"#;
        let b: Bead = serde_json::from_str(raw).unwrap();
        // Legacy "blocked" maps onto the canonical Review column
        assert_eq!(b.status, BeadStatus::Review);
        assert_eq!(b.priority, az_core::types::Priority::P1);
        assert!(b.parent.is_none());
    }

    #[test]
    fn test_display_line() {
        let b = bead("az-1", "Title", BeadStatus::Open);
        assert_eq!(b.display(), "az-1 [P2] Title");
    }
}
