//! Message contracts between the UI and the coordinator.
//!
//! [`Request`] flows UI → coordinator; [`UiMsg`] events flow back through
//! the subscription channel. Both are plain data so the update function
//! stays pure.

use std::path::PathBuf;

use az_core::error::Severity;
use az_core::types::{BeadId, BeadStatus, DevServerStatus, SessionState};
use az_core::projects::Project;
use az_store::{Bead, BeadDraft, BeadPatch};
use tokio::sync::mpsc;

/// Toast severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastLevel {
    /// Display duration in seconds: errors linger longer.
    pub fn duration_secs(&self) -> u64 {
        match self {
            Self::Error => 8,
            _ => 5,
        }
    }
}

impl From<Severity> for ToastLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Self::Info,
            Severity::Warning => Self::Warning,
            Severity::Error => Self::Error,
        }
    }
}

/// UI-visible states of the planning workflow. Transitions are externally
/// driven by the planning session's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanningState {
    #[default]
    Input,
    Generating,
    Reviewing,
    CreatingBeads,
    Complete,
    Error,
}

impl PlanningState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Describe the work",
            Self::Generating => "Generating plan...",
            Self::Reviewing => "Review the plan",
            Self::CreatingBeads => "Creating beads...",
            Self::Complete => "Plan complete",
            Self::Error => "Planning failed",
        }
    }
}

/// External-collaborator health report for the diagnostics overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsReport {
    pub bd_version: Option<String>,
    pub git_version: Option<String>,
    pub tmux_version: Option<String>,
    pub project_name: String,
    pub project_path: PathBuf,
    pub worktree_base: PathBuf,
    pub log_file: PathBuf,
}

/// Requests the UI sends to the coordinator.
#[derive(Debug)]
pub enum Request {
    RefreshBeads,
    SwitchProject(PathBuf),
    StartSession {
        id: BeadId,
        /// Include the bead description as the initial prompt
        with_work: bool,
        /// Pass the permission-bypass flag
        yolo: bool,
    },
    AttachSession(BeadId),
    PauseSession(BeadId),
    ResumeSession(BeadId),
    StopSession(BeadId),
    ToggleDevServer { id: BeadId, server: String },
    ViewDevServer { id: BeadId, server: String },
    RestartDevServer { id: BeadId, server: String },
    UpdateFromMain(BeadId),
    MergeToMain(BeadId),
    MergeAndAttach(BeadId),
    AbortMerge(BeadId),
    CreatePr(BeadId),
    DeleteCleanup(BeadId),
    /// Move a bead by column delta (clamped to the board)
    MoveTask { id: BeadId, delta: i8 },
    CreateBead(BeadDraft),
    /// Create a bead, then immediately start an assistant session on it
    /// with the draft as the working prompt
    CreateBeadAndStart(BeadDraft),
    EditBead { id: BeadId, patch: BeadPatch },
    DeleteBead(BeadId),
    PasteImage(BeadId),
    AttachFile { id: BeadId, path: PathBuf },
    OpenImage { id: BeadId, path: PathBuf },
    DeleteImage { id: BeadId, path: PathBuf },
    RunPlanning(String),
    AttachPlanningSession,
    /// Line-change stats for the bead's worktree (diff viewer)
    ShowDiff(BeadId),
    RunDiagnostics,
    SearchBeads(String),
    /// Quit gating: answered with Toast (refused) or QuitApproved
    RequestQuit,
    Subscribe(mpsc::UnboundedSender<UiMsg>),
}

/// Events the coordinator publishes to every subscriber.
#[derive(Debug, Clone)]
pub enum UiMsg {
    TasksUpdated(Vec<Bead>),
    SessionStateChanged(BeadId, SessionState),
    DevServerStateChanged(BeadId, String, DevServerStatus),
    Toast(String, ToastLevel),
    /// Merge needs a user decision: behind count plus probed conflicts
    RequestMergeChoice {
        id: BeadId,
        behind: u64,
        conflicts: Vec<String>,
    },
    ProjectChanged(Project),
    ProjectsUpdated(Vec<Project>),
    TaskMoveSucceeded(BeadId, BeadStatus),
    TaskMoveFailed(BeadId, String),
    SearchResults(Vec<BeadId>),
    PlanningStateChanged(PlanningState),
    Diagnostics(DiagnosticsReport),
    /// Reply to [`Request::ShowDiff`]
    DiffReady {
        id: BeadId,
        additions: u64,
        deletions: u64,
        files: Vec<String>,
    },
    /// The quit gate is clear; the UI may exit
    QuitApproved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toast_durations() {
        assert_eq!(ToastLevel::Error.duration_secs(), 8);
        assert_eq!(ToastLevel::Info.duration_secs(), 5);
        assert_eq!(ToastLevel::Success.duration_secs(), 5);
        assert_eq!(ToastLevel::Warning.duration_secs(), 5);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(ToastLevel::from(Severity::Warning), ToastLevel::Warning);
        assert_eq!(ToastLevel::from(Severity::Error), ToastLevel::Error);
    }
}
