//! Input routing: raw key events plus the effective mode become Msgs.
//!
//! The effective mode is a function of the model: when an overlay is
//! present the top of the stack owns the keys (plus the universal Escape);
//! otherwise the navigation mode routes. Unbound keys are ignored.

use az_core::types::{BeadStatus, IssueType, Priority, SessionState};
use az_coord::PlanningState;
use az_store::SortField;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::mode::{GotoState, Mode, Overlay};
use crate::model::Model;
use crate::msg::Msg;

/// One entry of the keybinding table (drives the help overlay).
#[derive(Debug, Clone, Copy)]
pub struct Keybinding {
    pub key: &'static str,
    pub mode: &'static str,
    pub description: &'static str,
}

/// The user-facing keybinding reference.
pub const KEYBINDINGS: &[Keybinding] = &[
    Keybinding { key: "h/j/k/l, arrows", mode: "normal", description: "Move cursor" },
    Keybinding { key: "Ctrl+D / Ctrl+U", mode: "normal", description: "Half page down / up" },
    Keybinding { key: "v", mode: "normal", description: "Select mode" },
    Keybinding { key: "g", mode: "normal", description: "Goto (g/e/h/l/p/w)" },
    Keybinding { key: "space", mode: "normal", description: "Action menu" },
    Keybinding { key: "/", mode: "normal", description: "Search" },
    Keybinding { key: ",", mode: "normal", description: "Sort" },
    Keybinding { key: "f", mode: "normal", description: "Filter" },
    Keybinding { key: "o", mode: "normal", description: "Orchestrate epic" },
    Keybinding { key: "Enter", mode: "normal", description: "Bead detail" },
    Keybinding { key: "c / C", mode: "normal", description: "Create bead / create with assistant" },
    Keybinding { key: "?", mode: "normal", description: "Help" },
    Keybinding { key: "s", mode: "normal", description: "Settings" },
    Keybinding { key: "d", mode: "normal", description: "Diagnostics" },
    Keybinding { key: "L", mode: "normal", description: "Logs" },
    Keybinding { key: "p", mode: "normal", description: "Planning" },
    Keybinding { key: "W", mode: "normal", description: "Projects" },
    Keybinding { key: "Tab", mode: "normal", description: "Toggle compact view" },
    Keybinding { key: "q", mode: "normal", description: "Quit" },
    Keybinding { key: "s / S / !", mode: "action", description: "Start / start with work / start yolo" },
    Keybinding { key: "a", mode: "action", description: "Attach session" },
    Keybinding { key: "p / R / x", mode: "action", description: "Pause / resume / stop session" },
    Keybinding { key: "r / Ctrl+R / v", mode: "action", description: "Dev server toggle / restart / view" },
    Keybinding { key: "u", mode: "action", description: "Update from main" },
    Keybinding { key: "m / M", mode: "action", description: "Merge / abort merge" },
    Keybinding { key: "f", mode: "action", description: "Show diff" },
    Keybinding { key: "P", mode: "action", description: "Create PR" },
    Keybinding { key: "d / D", mode: "action", description: "Cleanup / delete bead" },
    Keybinding { key: "e", mode: "action", description: "Edit bead" },
    Keybinding { key: "i / I", mode: "action", description: "Attach image / list images" },
    Keybinding { key: "h / l", mode: "action", description: "Move task left / right" },
];

/// Stateless key router. All state lives in the model.
#[derive(Debug, Default)]
pub struct InputRouter;

impl InputRouter {
    pub fn new() -> Self {
        Self
    }

    /// Map a key event to at most one Msg given the effective mode.
    pub fn route(&self, key: KeyEvent, model: &Model) -> Option<Msg> {
        // Ctrl+C always force quits, whatever the mode
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Msg::ForceQuit);
        }

        if let Some(overlay) = model.top_overlay() {
            return self.route_overlay(key, overlay);
        }
        self.route_mode(key, model)
    }

    // =====================================================================
    // Overlay routing
    // =====================================================================

    fn route_overlay(&self, key: KeyEvent, overlay: &Overlay) -> Option<Msg> {
        // The universal escape closes the focused overlay
        if key.code == KeyCode::Esc && !matches!(overlay, Overlay::ConfirmDialog { .. }) {
            return Some(Msg::CloseOverlay);
        }

        if overlay.wants_text_input() {
            return self.route_text_input(key, overlay);
        }

        match overlay {
            Overlay::ConfirmDialog { .. } => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => Some(Msg::Confirm),
                KeyCode::Char('n') | KeyCode::Char('q') | KeyCode::Esc => Some(Msg::Deny),
                _ => None,
            },
            Overlay::MergeChoice { .. } => match key.code {
                KeyCode::Char(c @ ('m' | 's' | 'y' | 'n')) => Some(Msg::MergeChoiceKey(c)),
                KeyCode::Enter => Some(Msg::MergeChoiceKey('y')),
                _ => None,
            },
            Overlay::ActionMenu => self.route_action_key(key),
            Overlay::FilterMenu => match key.code {
                KeyCode::Char('s') => Some(Msg::OverlayKeyFilter('s')),
                KeyCode::Char('p') => Some(Msg::OverlayKeyFilter('p')),
                KeyCode::Char('t') => Some(Msg::OverlayKeyFilter('t')),
                KeyCode::Char('S') => Some(Msg::OverlayKeyFilter('S')),
                KeyCode::Char('e') => Some(Msg::ToggleHideEpicChildren),
                KeyCode::Char('a') => Some(Msg::OverlayKeyFilter('a')),
                KeyCode::Char('c') => Some(Msg::ClearFilters),
                _ => None,
            },
            Overlay::FilterStatusMenu => match key.code {
                KeyCode::Char('o') => Some(Msg::ToggleFilterStatus(BeadStatus::Open)),
                KeyCode::Char('i') => Some(Msg::ToggleFilterStatus(BeadStatus::InProgress)),
                KeyCode::Char('r') => Some(Msg::ToggleFilterStatus(BeadStatus::Review)),
                KeyCode::Char('d') => Some(Msg::ToggleFilterStatus(BeadStatus::Done)),
                _ => None,
            },
            Overlay::FilterPriorityMenu => match key.code {
                KeyCode::Char(c @ '0'..='4') => {
                    let priority = Priority::try_from(c as u8 - b'0').ok()?;
                    Some(Msg::ToggleFilterPriority(priority))
                }
                _ => None,
            },
            Overlay::FilterTypeMenu => match key.code {
                KeyCode::Char('t') => Some(Msg::ToggleFilterType(IssueType::Task)),
                KeyCode::Char('b') => Some(Msg::ToggleFilterType(IssueType::Bug)),
                KeyCode::Char('f') => Some(Msg::ToggleFilterType(IssueType::Feature)),
                KeyCode::Char('e') => Some(Msg::ToggleFilterType(IssueType::Epic)),
                KeyCode::Char('c') => Some(Msg::ToggleFilterType(IssueType::Chore)),
                _ => None,
            },
            Overlay::FilterSessionMenu => match key.code {
                KeyCode::Char('i') => Some(Msg::ToggleFilterSession(SessionState::Idle)),
                KeyCode::Char('b') => Some(Msg::ToggleFilterSession(SessionState::Busy)),
                KeyCode::Char('w') => Some(Msg::ToggleFilterSession(SessionState::Waiting)),
                KeyCode::Char('p') => Some(Msg::ToggleFilterSession(SessionState::Paused)),
                KeyCode::Char('d') => Some(Msg::ToggleFilterSession(SessionState::Done)),
                KeyCode::Char('e') => Some(Msg::ToggleFilterSession(SessionState::Error)),
                _ => None,
            },
            Overlay::SortMenu => match key.code {
                KeyCode::Char('s') => Some(Msg::SetSort(SortField::Session)),
                KeyCode::Char('p') => Some(Msg::SetSort(SortField::Priority)),
                KeyCode::Char('u') => Some(Msg::SetSort(SortField::Updated)),
                _ => None,
            },
            Overlay::Help
            | Overlay::Diagnostics { .. }
            | Overlay::ImagePreview { .. }
            | Overlay::Settings { .. } => match key.code {
                KeyCode::Char('q') => Some(Msg::CloseOverlay),
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OverlayDown),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OverlayUp),
                _ => None,
            },
            Overlay::Logs { .. } => match key.code {
                KeyCode::Char('q') => Some(Msg::CloseOverlay),
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OverlayDown),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OverlayUp),
                _ => None,
            },
            Overlay::ProjectSelector { .. } | Overlay::ImageList { .. } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OverlayDown),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OverlayUp),
                KeyCode::Enter => Some(Msg::OverlaySelect),
                KeyCode::Char('d') | KeyCode::Char('x') => Some(Msg::Deny),
                _ => None,
            },
            Overlay::DevServerMenu { .. } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OverlayDown),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OverlayUp),
                KeyCode::Enter => Some(Msg::OverlaySelect),
                KeyCode::Char('r') => Some(Msg::DevServerRestart),
                KeyCode::Char('v') => Some(Msg::DevServerView),
                _ => None,
            },
            Overlay::Detail { .. } => match key.code {
                KeyCode::Char('q') => Some(Msg::CloseOverlay),
                KeyCode::Char('e') => Some(Msg::EditBead),
                _ => None,
            },
            Overlay::DiffViewer { .. } => match key.code {
                KeyCode::Char('q') => Some(Msg::CloseOverlay),
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OverlayDown),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OverlayUp),
                _ => None,
            },
            Overlay::Planning { state, .. } => match (state, key.code) {
                (PlanningState::Input, _) => unreachable!("routed as text input"),
                (_, KeyCode::Char('a')) => Some(Msg::OverlaySelect),
                (_, KeyCode::Char('q')) => Some(Msg::CloseOverlay),
                _ => None,
            },
            Overlay::ImageAttach { .. } => unreachable!("routed as text input"),
        }
    }

    /// Printable characters, backspace, enter for overlay text fields.
    fn route_text_input(&self, key: KeyEvent, overlay: &Overlay) -> Option<Msg> {
        match key.code {
            KeyCode::Enter => Some(Msg::InputCommit),
            KeyCode::Backspace => Some(Msg::InputBackspace),
            KeyCode::Tab => match overlay {
                // Tab switches between title and notes in the detail form
                Overlay::Detail { .. } => Some(Msg::OverlaySelect),
                _ => None,
            },
            KeyCode::Char(c) => Some(Msg::InputChar(c)),
            _ => None,
        }
    }

    /// Space-prefix action keys (ActionMenu overlay focused).
    fn route_action_key(&self, key: KeyEvent) -> Option<Msg> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
            return Some(Msg::DevServerRestart);
        }
        match key.code {
            KeyCode::Char('s') => Some(Msg::StartSession { with_work: false, yolo: false }),
            KeyCode::Char('S') => Some(Msg::StartSession { with_work: true, yolo: false }),
            KeyCode::Char('!') => Some(Msg::StartSession { with_work: false, yolo: true }),
            KeyCode::Char('a') => Some(Msg::AttachSession),
            KeyCode::Char('p') => Some(Msg::PauseSession),
            KeyCode::Char('R') => Some(Msg::ResumeSession),
            KeyCode::Char('x') => Some(Msg::StopSession),
            KeyCode::Char('r') => Some(Msg::DevServerToggle),
            KeyCode::Char('v') => Some(Msg::DevServerView),
            KeyCode::Char('u') => Some(Msg::UpdateFromMain),
            KeyCode::Char('m') => Some(Msg::MergeToMain),
            KeyCode::Char('M') => Some(Msg::AbortMerge),
            KeyCode::Char('f') => Some(Msg::ShowDiff),
            KeyCode::Char('P') => Some(Msg::CreatePr),
            KeyCode::Char('d') => Some(Msg::RequestCleanup),
            KeyCode::Char('D') => Some(Msg::RequestDeleteBead),
            KeyCode::Char('e') => Some(Msg::EditBead),
            KeyCode::Char('i') => Some(Msg::AttachImage),
            KeyCode::Char('I') => Some(Msg::ListImages),
            KeyCode::Char('h') | KeyCode::Left => Some(Msg::MoveTask(-1)),
            KeyCode::Char('l') | KeyCode::Right => Some(Msg::MoveTask(1)),
            _ => None,
        }
    }

    // =====================================================================
    // Mode routing (no overlay)
    // =====================================================================

    fn route_mode(&self, key: KeyEvent, model: &Model) -> Option<Msg> {
        if key.code == KeyCode::Esc {
            return match model.mode {
                Mode::Normal => None,
                _ => Some(Msg::ExitMode),
            };
        }

        match &model.mode {
            Mode::Normal => self.route_normal(key),
            Mode::Select { .. } => match key.code {
                KeyCode::Char('v') => Some(Msg::ExitMode),
                KeyCode::Char(' ') => Some(Msg::ToggleSelect),
                KeyCode::Char('m') => Some(Msg::MergeSelectKey('m')),
                _ => self.route_movement(key),
            },
            Mode::Goto(GotoState::Pending) => match key.code {
                KeyCode::Char(c @ ('g' | 'e' | 'h' | 'l' | 'p' | 'w')) => Some(Msg::GotoKey(c)),
                _ => Some(Msg::ExitMode),
            },
            Mode::Goto(GotoState::Jump { .. }) => match key.code {
                KeyCode::Char(c) if c.is_ascii_lowercase() => Some(Msg::GotoKey(c)),
                _ => Some(Msg::ExitMode),
            },
            Mode::Search => match key.code {
                KeyCode::Enter => Some(Msg::InputCommit),
                KeyCode::Backspace => Some(Msg::InputBackspace),
                KeyCode::Char(c) => Some(Msg::InputChar(c)),
                _ => None,
            },
            // Sort and Filter modes keep their overlay focused; reaching
            // here means the overlay was closed out from under them.
            Mode::Sort | Mode::Filter => Some(Msg::ExitMode),
            Mode::Action { .. } => Some(Msg::ExitMode),
            Mode::Orchestrate { .. } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::OrchestrateKey('j')),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::OrchestrateKey('k')),
                KeyCode::Char(' ') => Some(Msg::OrchestrateKey(' ')),
                KeyCode::Char('s') => Some(Msg::OrchestrateKey('s')),
                KeyCode::Char('o') | KeyCode::Char('q') => Some(Msg::ExitMode),
                _ => None,
            },
            Mode::MergeSelect { .. } => match key.code {
                KeyCode::Char('j') | KeyCode::Down => Some(Msg::MergeSelectKey('j')),
                KeyCode::Char('k') | KeyCode::Up => Some(Msg::MergeSelectKey('k')),
                KeyCode::Enter => Some(Msg::MergeSelectKey('\n')),
                _ => None,
            },
        }
    }

    fn route_normal(&self, key: KeyEvent) -> Option<Msg> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('d') => Some(Msg::HalfPage { down: true }),
                KeyCode::Char('u') => Some(Msg::HalfPage { down: false }),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char('v') => Some(Msg::EnterSelect),
            KeyCode::Char('g') => Some(Msg::EnterGoto),
            KeyCode::Char(' ') => Some(Msg::OpenActionMenu),
            KeyCode::Char('/') => Some(Msg::EnterSearch),
            KeyCode::Char(',') => Some(Msg::EnterSortMenu),
            KeyCode::Char('f') => Some(Msg::EnterFilterMenu),
            KeyCode::Char('o') => Some(Msg::EnterOrchestrate),
            KeyCode::Enter => Some(Msg::OpenDetail),
            KeyCode::Char('c') => Some(Msg::CreateBead { with_assistant: false }),
            KeyCode::Char('C') => Some(Msg::CreateBead { with_assistant: true }),
            KeyCode::Char('?') => Some(Msg::OpenHelp),
            KeyCode::Char('s') => Some(Msg::OpenSettings),
            KeyCode::Char('d') => Some(Msg::OpenDiagnostics),
            KeyCode::Char('L') => Some(Msg::OpenLogs { lines: Vec::new() }),
            KeyCode::Char('p') => Some(Msg::OpenPlanning),
            KeyCode::Char('W') => Some(Msg::OpenProjectSelector),
            KeyCode::Tab => Some(Msg::ToggleViewMode),
            KeyCode::Char('q') => Some(Msg::QuitRequested),
            _ => self.route_movement(key),
        }
    }

    fn route_movement(&self, key: KeyEvent) -> Option<Msg> {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => Some(Msg::MoveCursor { dx: -1, dy: 0 }),
            KeyCode::Char('l') | KeyCode::Right => Some(Msg::MoveCursor { dx: 1, dy: 0 }),
            KeyCode::Char('j') | KeyCode::Down => Some(Msg::MoveCursor { dx: 0, dy: 1 }),
            KeyCode::Char('k') | KeyCode::Up => Some(Msg::MoveCursor { dx: 0, dy: -1 }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_core::types::BeadStatus;
    use az_store::bead::test_support::bead;
    use chrono::TimeZone;

    fn model() -> Model {
        let now = chrono::Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut model = Model::new(now);
        model.beads = vec![bead("az-1", "a", BeadStatus::Open)];
        model
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn press_ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_normal_mode_navigation() {
        let router = InputRouter::new();
        let model = model();
        assert!(matches!(
            router.route(press(KeyCode::Char('j')), &model),
            Some(Msg::MoveCursor { dx: 0, dy: 1 })
        ));
        assert!(matches!(
            router.route(press(KeyCode::Left), &model),
            Some(Msg::MoveCursor { dx: -1, dy: 0 })
        ));
        assert!(matches!(
            router.route(press_ctrl('d'), &model),
            Some(Msg::HalfPage { down: true })
        ));
    }

    #[test]
    fn test_normal_mode_entries() {
        let router = InputRouter::new();
        let model = model();
        assert!(matches!(
            router.route(press(KeyCode::Char(' ')), &model),
            Some(Msg::OpenActionMenu)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('/')), &model),
            Some(Msg::EnterSearch)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('q')), &model),
            Some(Msg::QuitRequested)
        ));
    }

    #[test]
    fn test_unbound_key_is_ignored() {
        let router = InputRouter::new();
        let model = model();
        assert!(router.route(press(KeyCode::Char('Z')), &model).is_none());
    }

    #[test]
    fn test_ctrl_c_always_force_quits() {
        let router = InputRouter::new();
        let mut model = model();
        model.push_overlay(Overlay::Help);
        assert!(matches!(
            router.route(press_ctrl('c'), &model),
            Some(Msg::ForceQuit)
        ));
    }

    #[test]
    fn test_overlay_masks_normal_bindings() {
        let router = InputRouter::new();
        let mut model = model();
        model.push_overlay(Overlay::Help);
        // 'q' closes the overlay instead of quitting
        assert!(matches!(
            router.route(press(KeyCode::Char('q')), &model),
            Some(Msg::CloseOverlay)
        ));
        // '/' is not bound inside Help
        assert!(router.route(press(KeyCode::Char('/')), &model).is_none());
    }

    #[test]
    fn test_action_menu_keys() {
        let router = InputRouter::new();
        let mut model = model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);

        assert!(matches!(
            router.route(press(KeyCode::Char('s')), &model),
            Some(Msg::StartSession { with_work: false, yolo: false })
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('S')), &model),
            Some(Msg::StartSession { with_work: true, yolo: false })
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('!')), &model),
            Some(Msg::StartSession { with_work: false, yolo: true })
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('l')), &model),
            Some(Msg::MoveTask(1))
        ));
        assert!(matches!(
            router.route(press_ctrl('r'), &model),
            Some(Msg::DevServerRestart)
        ));
    }

    #[test]
    fn test_confirm_dialog_keys() {
        let router = InputRouter::new();
        let mut model = model();
        model.push_overlay(Overlay::ConfirmDialog {
            pending: crate::mode::PendingAction::DeleteBead("az-1".into()),
        });

        assert!(matches!(
            router.route(press(KeyCode::Char('y')), &model),
            Some(Msg::Confirm)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Enter), &model),
            Some(Msg::Confirm)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('n')), &model),
            Some(Msg::Deny)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Esc), &model),
            Some(Msg::Deny)
        ));
    }

    #[test]
    fn test_merge_choice_keys() {
        let router = InputRouter::new();
        let mut model = model();
        model.push_overlay(Overlay::MergeChoice {
            bead: "az-1".into(),
            behind: 3,
            conflicts: vec!["src/a.txt".into()],
            in_progress: false,
        });
        assert!(matches!(
            router.route(press(KeyCode::Char('m')), &model),
            Some(Msg::MergeChoiceKey('m'))
        ));
        assert!(matches!(
            router.route(press(KeyCode::Char('s')), &model),
            Some(Msg::MergeChoiceKey('s'))
        ));
    }

    #[test]
    fn test_goto_pending_keys() {
        let router = InputRouter::new();
        let mut model = model();
        model.mode = Mode::Goto(GotoState::Pending);
        assert!(matches!(
            router.route(press(KeyCode::Char('w')), &model),
            Some(Msg::GotoKey('w'))
        ));
        // Unknown goto key falls back to Normal
        assert!(matches!(
            router.route(press(KeyCode::Char('z')), &model),
            Some(Msg::ExitMode)
        ));
    }

    #[test]
    fn test_search_text_input() {
        let router = InputRouter::new();
        let mut model = model();
        model.mode = Mode::Search;
        assert!(matches!(
            router.route(press(KeyCode::Char('x')), &model),
            Some(Msg::InputChar('x'))
        ));
        assert!(matches!(
            router.route(press(KeyCode::Backspace), &model),
            Some(Msg::InputBackspace)
        ));
        assert!(matches!(
            router.route(press(KeyCode::Enter), &model),
            Some(Msg::InputCommit)
        ));
    }

    #[test]
    fn test_filter_submenu_toggles() {
        let router = InputRouter::new();
        let mut model = model();
        model.push_overlay(Overlay::FilterStatusMenu);
        assert!(matches!(
            router.route(press(KeyCode::Char('i')), &model),
            Some(Msg::ToggleFilterStatus(BeadStatus::InProgress))
        ));

        model.overlays.clear();
        model.push_overlay(Overlay::FilterPriorityMenu);
        assert!(matches!(
            router.route(press(KeyCode::Char('0')), &model),
            Some(Msg::ToggleFilterPriority(az_core::types::Priority::P0))
        ));
    }
}
