//! The UI model: everything the view renders and update mutates.

use std::collections::HashMap;

use az_coord::{DiagnosticsReport, PlanningState};
use az_core::projects::Project;
use az_core::types::{BeadId, BeadStatus, DevServerStatus, SessionState, Timestamp};
use az_store::{Bead, FilterState, SortField, apply_filters, apply_sort, columns};

use crate::mode::{Mode, Overlay};
use crate::theme::Theme;
use crate::toast::Toasts;

/// Board cursor: column plus task index within the filtered column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    pub column: usize,
    pub task: usize,
}

/// Pure cursor movement over the current column lengths.
///
/// Horizontal moves clamp to columns 0..=3 and re-clamp the task index to
/// the destination column; vertical moves clamp within the column. Empty
/// columns pin the task index to 0.
pub fn move_cursor(cursor: Cursor, dx: i8, dy: i16, column_lengths: [usize; 4]) -> Cursor {
    let column = (cursor.column as i8 + dx).clamp(0, 3) as usize;
    let len = column_lengths[column];
    let task = if len == 0 {
        0
    } else {
        let base = cursor.task.min(len - 1) as i16;
        (base + dy).clamp(0, len as i16 - 1) as usize
    };
    Cursor { column, task }
}

/// Generate 2-character jump labels `aa, ab, .., az, ba, ..` for `n` tasks.
pub fn jump_labels(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let first = (b'a' + (i / 26) as u8 % 26) as char;
            let second = (b'a' + (i % 26) as u8) as char;
            format!("{first}{second}")
        })
        .collect()
}

/// The complete UI state.
pub struct Model {
    /// Cached bead snapshot (with optimistic targets already applied by the
    /// coordinator on refresh; eager moves applied here in between)
    pub beads: Vec<Bead>,
    /// Session state mirror; missing entry = Idle
    pub sessions: HashMap<BeadId, SessionState>,
    /// Dev-server state mirror per (bead, server)
    pub dev_servers: HashMap<(BeadId, String), DevServerStatus>,
    /// Known dev-server names, for the dev server menu
    pub dev_server_names: Vec<String>,
    pub filters: FilterState,
    pub sort: SortField,
    pub mode: Mode,
    pub overlays: Vec<Overlay>,
    pub cursor: Cursor,
    /// Jump to this task's position on the next snapshot, superseding
    /// index clamping
    pub follow: Option<BeadId>,
    /// Pre-move statuses for rollback on TaskMoveFailed
    pub pre_images: HashMap<BeadId, BeadStatus>,
    pub toasts: Toasts,
    pub project: Option<Project>,
    pub projects: Vec<Project>,
    pub search_results: Vec<BeadId>,
    pub planning: PlanningState,
    pub diagnostics: Option<DiagnosticsReport>,
    /// Effective configuration rows for the settings overlay
    pub settings_rows: Vec<(String, String)>,
    pub theme: Theme,
    /// Compact one-line cards instead of full cards
    pub compact: bool,
    pub size: (u16, u16),
    /// Frozen clock for the current update cycle; the runtime refreshes it
    /// each tick so update stays deterministic
    pub now: Timestamp,
}

impl Model {
    pub fn new(now: Timestamp) -> Self {
        Self {
            beads: Vec::new(),
            sessions: HashMap::new(),
            dev_servers: HashMap::new(),
            dev_server_names: Vec::new(),
            filters: FilterState::default(),
            sort: SortField::default(),
            mode: Mode::Normal,
            overlays: Vec::new(),
            cursor: Cursor::default(),
            follow: None,
            pre_images: HashMap::new(),
            toasts: Toasts::default(),
            project: None,
            projects: Vec::new(),
            search_results: Vec::new(),
            planning: PlanningState::Input,
            diagnostics: None,
            settings_rows: Vec::new(),
            theme: Theme::default(),
            compact: false,
            size: (80, 24),
            now,
        }
    }

    /// The filtered, sorted view feeding the board.
    pub fn view(&self) -> Vec<&Bead> {
        let filtered = apply_filters(&self.beads, &self.filters, &self.sessions, self.now);
        apply_sort(filtered, self.sort, &self.sessions)
    }

    /// The four board columns of the current view.
    pub fn board(&self) -> [Vec<&Bead>; 4] {
        columns(&self.view())
    }

    /// Lengths of the four columns.
    pub fn column_lengths(&self) -> [usize; 4] {
        let board = self.board();
        [board[0].len(), board[1].len(), board[2].len(), board[3].len()]
    }

    /// Visible tasks in visual order: columns left to right, tasks top to
    /// bottom. Jump labels and Orchestrate follow this order.
    pub fn visual_order(&self) -> Vec<BeadId> {
        self.board()
            .iter()
            .flat_map(|col| col.iter().map(|b| b.id.clone()))
            .collect()
    }

    /// The bead id under the cursor, if the column is non-empty.
    pub fn cursor_bead_id(&self) -> Option<BeadId> {
        self.board()[self.cursor.column]
            .get(self.cursor.task)
            .map(|b| b.id.clone())
    }

    /// Position of a bead in the current view.
    pub fn position_of(&self, id: &BeadId) -> Option<Cursor> {
        for (column, beads) in self.board().iter().enumerate() {
            if let Some(task) = beads.iter().position(|b| &b.id == id) {
                return Some(Cursor { column, task });
            }
        }
        None
    }

    /// Re-clamp the cursor after the filtered view changed. A follow hint
    /// supersedes index clamping by jumping to the followed bead.
    pub fn clamp_cursor(&mut self) {
        if let Some(id) = self.follow.take() {
            if let Some(position) = self.position_of(&id) {
                self.cursor = position;
                return;
            }
        }
        self.cursor = move_cursor(self.cursor, 0, 0, self.column_lengths());
    }

    /// Session state for a bead; missing entry is Idle.
    pub fn session_state(&self, id: &BeadId) -> SessionState {
        self.sessions.get(id).copied().unwrap_or_default()
    }

    /// Top of the overlay stack, which owns keyboard focus.
    pub fn top_overlay(&self) -> Option<&Overlay> {
        self.overlays.last()
    }

    pub fn top_overlay_mut(&mut self) -> Option<&mut Overlay> {
        self.overlays.last_mut()
    }

    /// Push an overlay onto the stack, giving it focus.
    pub fn push_overlay(&mut self, overlay: Overlay) {
        self.overlays.push(overlay);
    }

    /// Pop the focused overlay. With an empty stack the mode resets to
    /// Normal elsewhere; popping itself is a plain stack operation.
    pub fn pop_overlay(&mut self) -> Option<Overlay> {
        self.overlays.pop()
    }

    /// The task an action targets: the id captured at Action-mode entry
    /// wins over the cursor position.
    pub fn action_target(&self) -> Option<BeadId> {
        match &self.mode {
            Mode::Action { task_id } => Some(task_id.clone()),
            _ => self.cursor_bead_id(),
        }
    }

    /// Find a cached bead by id.
    pub fn bead(&self, id: &BeadId) -> Option<&Bead> {
        self.beads.iter().find(|b| &b.id == id)
    }

    pub fn bead_mut(&mut self, id: &BeadId) -> Option<&mut Bead> {
        self.beads.iter_mut().find(|b| &b.id == id)
    }

    /// Children of an epic in the current cache.
    pub fn children_of(&self, epic: &BeadId) -> Vec<BeadId> {
        self.beads
            .iter()
            .filter(|b| b.parent.as_ref() == Some(epic))
            .map(|b| b.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_store::bead::test_support::bead;
    use chrono::TimeZone;

    fn fixed_now() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    pub(crate) fn model_with(beads: Vec<Bead>) -> Model {
        let mut model = Model::new(fixed_now());
        model.beads = beads;
        model
    }

    #[test]
    fn test_move_cursor_clamps_left_edge() {
        let cursor = move_cursor(Cursor { column: 0, task: 1 }, -1, 0, [3, 0, 0, 0]);
        assert_eq!(cursor.column, 0);
        assert_eq!(cursor.task, 1);
    }

    #[test]
    fn test_move_cursor_clamps_right_edge() {
        let cursor = move_cursor(Cursor { column: 3, task: 0 }, 1, 0, [0, 0, 0, 2]);
        assert_eq!(cursor.column, 3);
    }

    #[test]
    fn test_move_cursor_clamps_bottom() {
        let cursor = move_cursor(Cursor { column: 0, task: 2 }, 0, 1, [3, 0, 0, 0]);
        assert_eq!(cursor.task, 2);
    }

    #[test]
    fn test_move_cursor_empty_column_pins_zero() {
        let cursor = move_cursor(Cursor { column: 0, task: 2 }, 1, 0, [3, 0, 0, 0]);
        assert_eq!(cursor, Cursor { column: 1, task: 0 });
    }

    #[test]
    fn test_move_cursor_reclamps_task_on_column_change() {
        let cursor = move_cursor(Cursor { column: 0, task: 4 }, 1, 0, [5, 2, 0, 0]);
        assert_eq!(cursor, Cursor { column: 1, task: 1 });
    }

    #[test]
    fn test_jump_labels_unique_and_ordered() {
        let labels = jump_labels(30);
        assert_eq!(labels.len(), 30);
        assert_eq!(labels[0], "aa");
        assert_eq!(labels[25], "az");
        assert_eq!(labels[26], "ba");
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 30);
    }

    #[test]
    fn test_visual_order_is_column_major() {
        let model = model_with(vec![
            bead("az-1", "a", BeadStatus::Done),
            bead("az-2", "b", BeadStatus::Open),
            bead("az-3", "c", BeadStatus::Open),
        ]);
        assert_eq!(model.visual_order(), vec!["az-2", "az-3", "az-1"]);
    }

    #[test]
    fn test_cursor_bead_id_tracks_board() {
        let mut model = model_with(vec![
            bead("az-1", "a", BeadStatus::Open),
            bead("az-2", "b", BeadStatus::InProgress),
        ]);
        model.cursor = Cursor { column: 1, task: 0 };
        assert_eq!(model.cursor_bead_id().as_deref(), Some("az-2"));
        model.cursor = Cursor { column: 2, task: 0 };
        assert_eq!(model.cursor_bead_id(), None);
    }

    #[test]
    fn test_follow_hint_supersedes_clamping() {
        let mut model = model_with(vec![
            bead("az-1", "a", BeadStatus::Open),
            bead("az-2", "b", BeadStatus::InProgress),
        ]);
        model.cursor = Cursor { column: 0, task: 0 };
        model.follow = Some("az-2".into());
        model.clamp_cursor();
        assert_eq!(model.cursor, Cursor { column: 1, task: 0 });
        assert!(model.follow.is_none());
    }

    #[test]
    fn test_action_target_prefers_captured_id() {
        let mut model = model_with(vec![
            bead("az-1", "a", BeadStatus::Open),
            bead("az-2", "b", BeadStatus::Open),
        ]);
        model.cursor = Cursor { column: 0, task: 1 };
        model.mode = Mode::Action {
            task_id: "az-1".into(),
        };
        assert_eq!(model.action_target().as_deref(), Some("az-1"));
    }

    #[test]
    fn test_children_of_epic() {
        let mut epic = bead("az-e", "epic", BeadStatus::Open);
        epic.issue_type = az_core::types::IssueType::Epic;
        let mut child = bead("az-c", "child", BeadStatus::Open);
        child.parent = Some("az-e".into());
        let model = model_with(vec![epic, child]);
        assert_eq!(model.children_of(&"az-e".to_string()), vec!["az-c"]);
    }
}
