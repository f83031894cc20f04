//! The stacked UI mode machine: navigation mode × overlay stack.
//!
//! Exactly one [`Mode`] is active at a time. Overlays stack LIFO on top of
//! the board; while any overlay is present only its keybindings (plus the
//! universal Escape) are live.

use std::collections::BTreeSet;
use std::path::PathBuf;

use az_coord::{DiagnosticsReport, PlanningState};
use az_core::types::BeadId;
use az_store::Bead;

/// Goto sub-mode: `g` pressed, optionally followed by `w` for jump labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoState {
    /// `g` pressed; waiting for the goto command key
    Pending,
    /// Jump labels assigned to every visible task, in visual order
    Jump {
        labels: Vec<(String, BeadId)>,
        pending: Option<char>,
    },
}

/// Navigation mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Multi-select; actions apply to the selected set
    Select { selected: BTreeSet<BeadId> },
    /// Action pending on a captured task. The id is captured at mode entry
    /// so queued effects cannot race with cursor movement.
    Action { task_id: BeadId },
    Goto(GotoState),
    /// Incremental search; the query keeps filtering after commit
    Search,
    Sort,
    Filter,
    /// Drill-down into an epic's children
    Orchestrate {
        epic: BeadId,
        children: Vec<BeadId>,
        focus: usize,
        selected: BTreeSet<BeadId>,
    },
    /// Pick which selected bead's branch to merge
    MergeSelect {
        source: Vec<BeadId>,
        focus: usize,
    },
}

impl Mode {
    /// Short tag for the status line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Select { .. } => "SELECT",
            Self::Action { .. } => "ACTION",
            Self::Goto(GotoState::Pending) => "GOTO",
            Self::Goto(GotoState::Jump { .. }) => "JUMP",
            Self::Search => "SEARCH",
            Self::Sort => "SORT",
            Self::Filter => "FILTER",
            Self::Orchestrate { .. } => "ORCHESTRATE",
            Self::MergeSelect { .. } => "MERGE",
        }
    }
}

/// Which text field of the detail overlay is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailField {
    #[default]
    Title,
    Notes,
}

/// Edit state inside the detail overlay. Doubles as the create form when
/// `existing` is None.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailEdit {
    pub existing: Option<BeadId>,
    pub title: String,
    pub notes: String,
    pub field: DetailField,
    /// Start an assistant session on the new bead after creation
    pub with_assistant: bool,
}

/// Action awaiting confirmation in a [`Overlay::ConfirmDialog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    DeleteBead(BeadId),
    Cleanup(BeadId),
    StopSession(BeadId),
}

impl PendingAction {
    /// Dialog prompt for this action.
    pub fn prompt(&self) -> String {
        match self {
            Self::DeleteBead(id) => format!("Delete {id}? Worktree and session are torn down first."),
            Self::Cleanup(id) => format!("Remove worktree and session for {id}?"),
            Self::StopSession(id) => format!("Stop the session for {id}?"),
        }
    }
}

/// Modal overlays, topmost has keyboard focus.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    ActionMenu,
    FilterMenu,
    FilterStatusMenu,
    FilterPriorityMenu,
    FilterTypeMenu,
    FilterSessionMenu,
    SortMenu,
    Help,
    Settings { focus: usize },
    Diagnostics { report: Option<DiagnosticsReport> },
    Logs { lines: Vec<String>, scroll: usize },
    ProjectSelector { focus: usize },
    Detail { bead: Box<Bead>, edit: Option<DetailEdit> },
    ImageAttach { bead: BeadId, input: String },
    ImageList { bead: BeadId, files: Vec<PathBuf>, focus: usize },
    ImagePreview { path: PathBuf },
    DevServerMenu { bead: BeadId, focus: usize },
    DiffViewer { bead: BeadId, additions: u64, deletions: u64, files: Vec<String> },
    MergeChoice { bead: BeadId, behind: u64, conflicts: Vec<String>, in_progress: bool },
    ConfirmDialog { pending: PendingAction },
    Planning { state: PlanningState, input: String },
}

impl Overlay {
    /// Overlay title for the frame border.
    pub fn title(&self) -> &'static str {
        match self {
            Self::ActionMenu => "Actions",
            Self::FilterMenu => "Filter",
            Self::FilterStatusMenu => "Filter: status",
            Self::FilterPriorityMenu => "Filter: priority",
            Self::FilterTypeMenu => "Filter: type",
            Self::FilterSessionMenu => "Filter: session",
            Self::SortMenu => "Sort",
            Self::Help => "Help",
            Self::Settings { .. } => "Settings",
            Self::Diagnostics { .. } => "Diagnostics",
            Self::Logs { .. } => "Logs",
            Self::ProjectSelector { .. } => "Projects",
            Self::Detail { .. } => "Bead",
            Self::ImageAttach { .. } => "Attach file",
            Self::ImageList { .. } => "Attachments",
            Self::ImagePreview { .. } => "Preview",
            Self::DevServerMenu { .. } => "Dev servers",
            Self::DiffViewer { .. } => "Diff",
            Self::MergeChoice { .. } => "Merge",
            Self::ConfirmDialog { .. } => "Confirm",
            Self::Planning { .. } => "Planning",
        }
    }

    /// Whether this overlay routes printable characters into a text input.
    pub fn wants_text_input(&self) -> bool {
        match self {
            Self::ImageAttach { .. } => true,
            Self::Detail { edit, .. } => edit.is_some(),
            Self::Planning { state, .. } => *state == PlanningState::Input,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_tags() {
        assert_eq!(Mode::Normal.tag(), "NORMAL");
        assert_eq!(Mode::Goto(GotoState::Pending).tag(), "GOTO");
        assert_eq!(
            Mode::Goto(GotoState::Jump {
                labels: Vec::new(),
                pending: None
            })
            .tag(),
            "JUMP"
        );
    }

    #[test]
    fn test_overlay_text_input_routing() {
        assert!(Overlay::ImageAttach {
            bead: "az-1".into(),
            input: String::new()
        }
        .wants_text_input());
        assert!(!Overlay::Help.wants_text_input());
        assert!(!Overlay::Planning {
            state: PlanningState::Generating,
            input: String::new()
        }
        .wants_text_input());
        assert!(Overlay::Planning {
            state: PlanningState::Input,
            input: String::new()
        }
        .wants_text_input());
    }

    #[test]
    fn test_pending_action_prompts_name_the_bead() {
        let prompt = PendingAction::DeleteBead("az-7".into()).prompt();
        assert!(prompt.contains("az-7"));
    }
}
