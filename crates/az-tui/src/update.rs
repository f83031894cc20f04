//! The pure update function: `(Model, Msg) -> Effect`.
//!
//! Every transition in the mode machine and every coordinator event passes
//! through here. The function never fails; error outcomes arrive as Msgs
//! and leave as toasts. The one deliberate impurity is listing a bead's
//! attachment directory when the image list opens.

use az_coord::{PlanningState, Request, ToastLevel, UiMsg};
use az_core::types::{BeadId, BeadStatus, IssueType};
use az_store::{BeadDraft, BeadPatch, images};

use crate::effect::Effect;
use crate::mode::{DetailEdit, DetailField, GotoState, Mode, Overlay, PendingAction};
use crate::model::{Cursor, Model, jump_labels, move_cursor};
use crate::msg::Msg;

/// Apply one message to the model, producing the effects to run.
pub fn update(model: &mut Model, msg: Msg) -> Effect {
    match msg {
        // =================================================================
        // Navigation
        // =================================================================
        Msg::MoveCursor { dx, dy } => {
            model.cursor = move_cursor(model.cursor, dx, i16::from(dy), model.column_lengths());
            Effect::none()
        }
        Msg::HalfPage { down } => {
            let dy = if down { 10 } else { -10 };
            model.cursor = move_cursor(model.cursor, 0, dy, model.column_lengths());
            Effect::none()
        }
        Msg::JumpTo { column, task } => {
            model.cursor = move_cursor(Cursor { column, task }, 0, 0, model.column_lengths());
            Effect::none()
        }

        // =================================================================
        // Mode transitions
        // =================================================================
        Msg::EnterSelect => {
            let selected = model.cursor_bead_id().into_iter().collect();
            model.mode = Mode::Select { selected };
            Effect::none()
        }
        Msg::ToggleSelect => {
            if let (Some(id), Mode::Select { selected }) =
                (model.cursor_bead_id(), &mut model.mode)
            {
                if !selected.remove(&id) {
                    selected.insert(id);
                }
            }
            Effect::none()
        }
        Msg::ExitMode => {
            model.mode = Mode::Normal;
            Effect::none()
        }
        Msg::EnterGoto => {
            model.mode = Mode::Goto(GotoState::Pending);
            Effect::none()
        }
        Msg::GotoKey(c) => goto_key(model, c),
        Msg::OpenActionMenu => match model.cursor_bead_id() {
            Some(task_id) => {
                model.mode = Mode::Action { task_id };
                model.push_overlay(Overlay::ActionMenu);
                Effect::none()
            }
            None => toast(model, ToastLevel::Warning, "no task under cursor"),
        },
        Msg::EnterSearch => {
            model.mode = Mode::Search;
            Effect::none()
        }
        Msg::EnterSortMenu => {
            model.mode = Mode::Sort;
            model.push_overlay(Overlay::SortMenu);
            Effect::none()
        }
        Msg::EnterFilterMenu => {
            model.mode = Mode::Filter;
            model.push_overlay(Overlay::FilterMenu);
            Effect::none()
        }
        Msg::EnterOrchestrate => enter_orchestrate(model),
        Msg::OrchestrateKey(c) => orchestrate_key(model, c),
        Msg::MergeSelectKey(c) => merge_select_key(model, c),

        // =================================================================
        // Text input
        // =================================================================
        Msg::InputChar(c) => {
            input_edit(model, |buf| buf.push(c));
            model.clamp_cursor();
            Effect::none()
        }
        Msg::InputBackspace => {
            input_edit(model, |buf| {
                buf.pop();
            });
            model.clamp_cursor();
            Effect::none()
        }
        Msg::InputCommit => input_commit(model),

        // =================================================================
        // Filters and sort
        // =================================================================
        Msg::SetSort(field) => {
            model.sort = field;
            model.pop_overlay();
            model.mode = Mode::Normal;
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ToggleFilterStatus(status) => {
            model.filters.toggle_status(status);
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ToggleFilterPriority(priority) => {
            model.filters.toggle_priority(priority);
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ToggleFilterType(issue_type) => {
            model.filters.toggle_type(issue_type);
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ToggleFilterSession(state) => {
            model.filters.toggle_session_state(state);
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ToggleHideEpicChildren => {
            model.filters.hide_epic_children = !model.filters.hide_epic_children;
            model.clamp_cursor();
            Effect::none()
        }
        Msg::SetAgeFilter(days) => {
            model.filters.min_age_days = days;
            model.clamp_cursor();
            Effect::none()
        }
        Msg::ClearFilters => {
            model.filters.clear();
            model.clamp_cursor();
            Effect::none()
        }
        Msg::OverlayKeyFilter(c) => {
            let overlay = match c {
                's' => Some(Overlay::FilterStatusMenu),
                'p' => Some(Overlay::FilterPriorityMenu),
                't' => Some(Overlay::FilterTypeMenu),
                'S' => Some(Overlay::FilterSessionMenu),
                'a' => {
                    // Cycle the age filter: off -> 7 -> 30 -> off
                    model.filters.min_age_days = match model.filters.min_age_days {
                        None => Some(7),
                        Some(7) => Some(30),
                        Some(_) => None,
                    };
                    model.clamp_cursor();
                    None
                }
                _ => None,
            };
            if let Some(overlay) = overlay {
                model.push_overlay(overlay);
            }
            Effect::none()
        }

        // =================================================================
        // Overlay stack
        // =================================================================
        Msg::CloseOverlay => {
            model.pop_overlay();
            if model.overlays.is_empty() {
                model.mode = Mode::Normal;
            }
            Effect::none()
        }
        Msg::OverlayUp => {
            overlay_focus(model, -1);
            Effect::none()
        }
        Msg::OverlayDown => {
            overlay_focus(model, 1);
            Effect::none()
        }
        Msg::OverlaySelect => overlay_select(model),
        Msg::Confirm => confirm(model),
        Msg::Deny => deny(model),
        Msg::MergeChoiceKey(c) => merge_choice(model, c),

        // =================================================================
        // Board actions
        // =================================================================
        Msg::StartSession { with_work, yolo } => {
            for_targets(model, |id| Request::StartSession { id, with_work, yolo })
        }
        Msg::AttachSession => for_targets(model, Request::AttachSession),
        Msg::PauseSession => for_targets(model, Request::PauseSession),
        Msg::ResumeSession => for_targets(model, Request::ResumeSession),
        Msg::StopSession => match action_targets(model).pop() {
            Some(id) => {
                leave_action(model);
                model.push_overlay(Overlay::ConfirmDialog {
                    pending: PendingAction::StopSession(id),
                });
                Effect::none()
            }
            None => leave_action_with_warning(model),
        },
        Msg::DevServerToggle => dev_server_action(model, DevIntent::Toggle),
        Msg::DevServerRestart => dev_server_action(model, DevIntent::Restart),
        Msg::DevServerView => dev_server_action(model, DevIntent::View),
        Msg::UpdateFromMain => for_targets(model, Request::UpdateFromMain),
        Msg::MergeToMain => for_targets(model, Request::MergeToMain),
        Msg::AbortMerge => for_targets(model, Request::AbortMerge),
        Msg::ShowDiff => show_diff(model),
        Msg::CreatePr => for_targets(model, Request::CreatePr),
        Msg::RequestCleanup => match action_targets(model).pop() {
            Some(id) => {
                leave_action(model);
                model.push_overlay(Overlay::ConfirmDialog {
                    pending: PendingAction::Cleanup(id),
                });
                Effect::none()
            }
            None => leave_action_with_warning(model),
        },
        Msg::RequestDeleteBead => match action_targets(model).pop() {
            Some(id) => {
                leave_action(model);
                model.push_overlay(Overlay::ConfirmDialog {
                    pending: PendingAction::DeleteBead(id),
                });
                Effect::none()
            }
            None => leave_action_with_warning(model),
        },
        Msg::MoveTask(delta) => move_task(model, delta),
        Msg::OpenDetail => match model.cursor_bead_id().and_then(|id| model.bead(&id).cloned()) {
            Some(bead) => {
                model.push_overlay(Overlay::Detail {
                    bead: Box::new(bead),
                    edit: None,
                });
                Effect::none()
            }
            None => Effect::none(),
        },
        Msg::EditBead => edit_bead(model),
        Msg::CreateBead { with_assistant } => {
            let draft = az_store::Bead {
                id: String::new(),
                title: String::new(),
                description: None,
                design: None,
                status: BeadStatus::Open,
                priority: Default::default(),
                issue_type: IssueType::Task,
                parent: None,
                created_at: model.now,
                updated_at: model.now,
            };
            model.push_overlay(Overlay::Detail {
                bead: Box::new(draft),
                edit: Some(DetailEdit {
                    existing: None,
                    with_assistant,
                    ..Default::default()
                }),
            });
            Effect::none()
        }
        Msg::AttachImage => match action_targets(model).pop() {
            Some(id) => {
                leave_action(model);
                model.push_overlay(Overlay::ImageAttach {
                    bead: id,
                    input: String::new(),
                });
                Effect::none()
            }
            None => leave_action_with_warning(model),
        },
        Msg::ListImages => match action_targets(model).pop() {
            Some(id) => {
                leave_action(model);
                let files = model
                    .project
                    .as_ref()
                    .and_then(|p| images::list_attachments(&p.path, &id).ok())
                    .unwrap_or_default();
                model.push_overlay(Overlay::ImageList {
                    bead: id,
                    files,
                    focus: 0,
                });
                Effect::none()
            }
            None => leave_action_with_warning(model),
        },

        // =================================================================
        // Top-level overlays
        // =================================================================
        Msg::OpenHelp => {
            model.push_overlay(Overlay::Help);
            Effect::none()
        }
        Msg::OpenSettings => {
            model.push_overlay(Overlay::Settings { focus: 0 });
            Effect::none()
        }
        Msg::OpenDiagnostics => {
            model.push_overlay(Overlay::Diagnostics {
                report: model.diagnostics.clone(),
            });
            Effect::from(Request::RunDiagnostics)
        }
        Msg::OpenLogs { lines } => {
            model.push_overlay(Overlay::Logs { lines, scroll: 0 });
            Effect::none()
        }
        Msg::OpenProjectSelector => {
            model.push_overlay(Overlay::ProjectSelector { focus: 0 });
            Effect::none()
        }
        Msg::OpenPlanning => {
            model.push_overlay(Overlay::Planning {
                state: model.planning,
                input: String::new(),
            });
            Effect::none()
        }
        Msg::ToggleViewMode => {
            model.compact = !model.compact;
            Effect::none()
        }

        // =================================================================
        // Coordinator events
        // =================================================================
        Msg::Coord(event) => coord_event(model, event),
        Msg::ToastExpired(id) => {
            model.toasts.expire(id);
            Effect::none()
        }
        Msg::Tick => {
            model.toasts.sweep(model.now);
            Effect::PollEvents
        }
        Msg::Resize(w, h) => {
            model.size = (w, h);
            Effect::none()
        }
        Msg::QuitRequested => Effect::from(Request::RequestQuit),
        Msg::ForceQuit => Effect::Quit,
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// Push a toast and schedule its expiration.
fn toast(model: &mut Model, level: ToastLevel, message: impl Into<String>) -> Effect {
    let (id, after) = model.toasts.push(level, message, model.now);
    Effect::ToastTimer { id, after }
}

/// Targets of a board action: the Action-mode capture, or the Select-mode
/// set, or the cursor task.
fn action_targets(model: &Model) -> Vec<BeadId> {
    match &model.mode {
        Mode::Action { task_id } => vec![task_id.clone()],
        Mode::Select { selected } if !selected.is_empty() => selected.iter().cloned().collect(),
        _ => model.cursor_bead_id().into_iter().collect(),
    }
}

/// Leave Action mode and close its menu.
fn leave_action(model: &mut Model) {
    if matches!(model.top_overlay(), Some(Overlay::ActionMenu)) {
        model.pop_overlay();
    }
    if matches!(model.mode, Mode::Action { .. }) {
        model.mode = Mode::Normal;
    }
}

fn leave_action_with_warning(model: &mut Model) -> Effect {
    leave_action(model);
    toast(model, ToastLevel::Warning, "no task selected")
}

/// Emit one request per action target.
fn for_targets(model: &mut Model, make: impl Fn(BeadId) -> Request) -> Effect {
    let targets = action_targets(model);
    leave_action(model);
    if targets.is_empty() {
        return toast(model, ToastLevel::Warning, "no task selected");
    }
    Effect::batch(targets.into_iter().map(|id| Effect::from(make(id))))
}

fn goto_key(model: &mut Model, c: char) -> Effect {
    match &model.mode {
        Mode::Goto(GotoState::Pending) => {
            match c {
                'g' => {
                    model.cursor =
                        move_cursor(Cursor { column: model.cursor.column, task: 0 }, 0, 0, model.column_lengths());
                }
                'e' => {
                    let len = model.column_lengths()[model.cursor.column];
                    model.cursor.task = len.saturating_sub(1);
                }
                'h' => {
                    model.cursor = move_cursor(
                        Cursor { column: 0, task: model.cursor.task },
                        0,
                        0,
                        model.column_lengths(),
                    );
                }
                'l' => {
                    model.cursor = move_cursor(
                        Cursor { column: 3, task: model.cursor.task },
                        0,
                        0,
                        model.column_lengths(),
                    );
                }
                'p' => {
                    // Jump to the cursor bead's epic parent
                    if let Some(parent) = model
                        .cursor_bead_id()
                        .and_then(|id| model.bead(&id).and_then(|b| b.parent.clone()))
                    {
                        if let Some(position) = model.position_of(&parent) {
                            model.cursor = position;
                        }
                    }
                }
                'w' => {
                    let order = model.visual_order();
                    let labels = jump_labels(order.len())
                        .into_iter()
                        .zip(order)
                        .collect();
                    model.mode = Mode::Goto(GotoState::Jump {
                        labels,
                        pending: None,
                    });
                    return Effect::none();
                }
                _ => {}
            }
            model.mode = Mode::Normal;
            Effect::none()
        }
        Mode::Goto(GotoState::Jump { labels, pending }) => match pending {
            None => {
                let labels = labels.clone();
                model.mode = Mode::Goto(GotoState::Jump {
                    labels,
                    pending: Some(c),
                });
                Effect::none()
            }
            Some(first) => {
                let label = format!("{first}{c}");
                let target = labels
                    .iter()
                    .find(|(l, _)| *l == label)
                    .map(|(_, id)| id.clone());
                model.mode = Mode::Normal;
                if let Some(id) = target {
                    if let Some(position) = model.position_of(&id) {
                        model.cursor = position;
                    }
                }
                Effect::none()
            }
        },
        _ => Effect::none(),
    }
}

fn enter_orchestrate(model: &mut Model) -> Effect {
    let Some(id) = model.cursor_bead_id() else {
        return Effect::none();
    };
    let is_epic = model
        .bead(&id)
        .is_some_and(|b| b.issue_type == IssueType::Epic);
    let children = model.children_of(&id);
    if !is_epic && children.is_empty() {
        return toast(model, ToastLevel::Info, format!("{id} has no children"));
    }
    model.mode = Mode::Orchestrate {
        epic: id,
        children,
        focus: 0,
        selected: Default::default(),
    };
    Effect::none()
}

fn orchestrate_key(model: &mut Model, c: char) -> Effect {
    let Mode::Orchestrate {
        children,
        focus,
        selected,
        ..
    } = &mut model.mode
    else {
        return Effect::none();
    };
    match c {
        'j' => *focus = (*focus + 1).min(children.len().saturating_sub(1)),
        'k' => *focus = focus.saturating_sub(1),
        ' ' => {
            if let Some(id) = children.get(*focus).cloned() {
                if !selected.remove(&id) {
                    selected.insert(id);
                }
            }
        }
        's' => {
            let ids: Vec<BeadId> = if selected.is_empty() {
                children.get(*focus).cloned().into_iter().collect()
            } else {
                selected.iter().cloned().collect()
            };
            model.mode = Mode::Normal;
            return Effect::batch(ids.into_iter().map(|id| {
                Effect::from(Request::StartSession {
                    id,
                    with_work: true,
                    yolo: false,
                })
            }));
        }
        _ => {}
    }
    Effect::none()
}

fn merge_select_key(model: &mut Model, c: char) -> Effect {
    match (&mut model.mode, c) {
        // Entering from Select mode
        (Mode::Select { selected }, 'm') if !selected.is_empty() => {
            let source: Vec<BeadId> = selected.iter().cloned().collect();
            model.mode = Mode::MergeSelect { source, focus: 0 };
            Effect::none()
        }
        (Mode::MergeSelect { source, focus }, 'j') => {
            *focus = (*focus + 1).min(source.len().saturating_sub(1));
            Effect::none()
        }
        (Mode::MergeSelect { focus, .. }, 'k') => {
            *focus = focus.saturating_sub(1);
            Effect::none()
        }
        (Mode::MergeSelect { source, focus }, '\n') => {
            let chosen = source.get(*focus).cloned();
            model.mode = Mode::Normal;
            match chosen {
                Some(id) => Effect::from(Request::MergeToMain(id)),
                None => Effect::none(),
            }
        }
        _ => Effect::none(),
    }
}

/// Route text edits to whichever buffer currently has input focus.
fn input_edit(model: &mut Model, f: impl FnOnce(&mut String)) {
    if let Some(overlay) = model.top_overlay_mut() {
        match overlay {
            Overlay::ImageAttach { input, .. } => f(input),
            Overlay::Planning { input, state } if *state == PlanningState::Input => f(input),
            Overlay::Detail {
                edit: Some(edit), ..
            } => match edit.field {
                DetailField::Title => f(&mut edit.title),
                DetailField::Notes => f(&mut edit.notes),
            },
            _ => {}
        }
        return;
    }
    if matches!(model.mode, Mode::Search) {
        f(&mut model.filters.query);
    }
}

fn input_commit(model: &mut Model) -> Effect {
    if let Some(overlay) = model.top_overlay().cloned() {
        match overlay {
            Overlay::ImageAttach { bead, input } => {
                model.pop_overlay();
                if input.trim().is_empty() {
                    // Empty path pastes from the clipboard
                    return Effect::from(Request::PasteImage(bead));
                }
                return Effect::from(Request::AttachFile {
                    id: bead,
                    path: input.trim().into(),
                });
            }
            Overlay::Planning { input, state } if state == PlanningState::Input => {
                if input.trim().is_empty() {
                    return toast(model, ToastLevel::Warning, "describe the work first");
                }
                if let Some(Overlay::Planning { state, .. }) = model.top_overlay_mut() {
                    *state = PlanningState::Generating;
                }
                model.planning = PlanningState::Generating;
                return Effect::from(Request::RunPlanning(input));
            }
            Overlay::Detail {
                edit: Some(edit), ..
            } => {
                if edit.title.trim().is_empty() {
                    return toast(model, ToastLevel::Warning, "title is required");
                }
                model.pop_overlay();
                return match edit.existing {
                    Some(id) => Effect::from(Request::EditBead {
                        id,
                        patch: BeadPatch {
                            title: Some(edit.title),
                            description: some_nonempty(edit.notes),
                            ..Default::default()
                        },
                    }),
                    None => {
                        let draft = BeadDraft {
                            title: edit.title,
                            description: some_nonempty(edit.notes),
                            ..Default::default()
                        };
                        if edit.with_assistant {
                            Effect::from(Request::CreateBeadAndStart(draft))
                        } else {
                            Effect::from(Request::CreateBead(draft))
                        }
                    }
                };
            }
            _ => {}
        }
        return Effect::none();
    }

    // Committing a search leaves the query applied and returns to Normal
    if matches!(model.mode, Mode::Search) {
        model.mode = Mode::Normal;
        model.clamp_cursor();
    }
    Effect::none()
}

fn some_nonempty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn overlay_focus(model: &mut Model, delta: i64) {
    let projects_len = model.projects.len();
    let servers_len = model.dev_server_names.len();
    if let Some(overlay) = model.top_overlay_mut() {
        let bump = |focus: &mut usize, len: usize| {
            if len == 0 {
                *focus = 0;
            } else {
                *focus = (*focus as i64 + delta).clamp(0, len as i64 - 1) as usize;
            }
        };
        match overlay {
            // One row per config section in the settings view
            Overlay::Settings { focus } => bump(focus, 12),
            Overlay::ProjectSelector { focus } => bump(focus, projects_len),
            Overlay::ImageList { focus, files, .. } => {
                let len = files.len();
                bump(focus, len);
            }
            Overlay::DevServerMenu { focus, .. } => bump(focus, servers_len),
            Overlay::Logs { scroll, lines } => {
                let len = lines.len();
                bump(scroll, len);
            }
            Overlay::DiffViewer { .. } => {}
            _ => {}
        }
    }
}

fn overlay_select(model: &mut Model) -> Effect {
    let Some(overlay) = model.top_overlay().cloned() else {
        return Effect::none();
    };
    match overlay {
        Overlay::ProjectSelector { focus } => {
            let path = model.projects.get(focus).map(|p| p.path.clone());
            model.pop_overlay();
            match path {
                Some(path) => Effect::from(Request::SwitchProject(path)),
                None => Effect::none(),
            }
        }
        Overlay::ImageList { files, focus, .. } => {
            if let Some(path) = files.get(focus).cloned() {
                model.push_overlay(Overlay::ImagePreview { path });
            }
            Effect::none()
        }
        Overlay::DevServerMenu { bead, focus } => {
            let server = model.dev_server_names.get(focus).cloned();
            match server {
                Some(server) => Effect::from(Request::ToggleDevServer { id: bead, server }),
                None => Effect::none(),
            }
        }
        Overlay::Planning { state, .. } if state != PlanningState::Input => {
            Effect::from(Request::AttachPlanningSession)
        }
        Overlay::Detail {
            edit: Some(_), ..
        } => {
            // Tab switches the focused field in the detail form
            if let Some(Overlay::Detail {
                edit: Some(edit), ..
            }) = model.top_overlay_mut()
            {
                edit.field = match edit.field {
                    DetailField::Title => DetailField::Notes,
                    DetailField::Notes => DetailField::Title,
                };
            }
            Effect::none()
        }
        _ => Effect::none(),
    }
}

fn confirm(model: &mut Model) -> Effect {
    if !matches!(model.top_overlay(), Some(Overlay::ConfirmDialog { .. })) {
        return Effect::none();
    }
    let Some(Overlay::ConfirmDialog { pending }) = model.pop_overlay() else {
        return Effect::none();
    };
    match pending {
        PendingAction::DeleteBead(id) => Effect::from(Request::DeleteBead(id)),
        PendingAction::Cleanup(id) => Effect::from(Request::DeleteCleanup(id)),
        PendingAction::StopSession(id) => Effect::from(Request::StopSession(id)),
    }
}

fn deny(model: &mut Model) -> Effect {
    match model.top_overlay().cloned() {
        Some(Overlay::ConfirmDialog { .. }) => {
            model.pop_overlay();
            Effect::none()
        }
        Some(Overlay::ImageList { bead, files, focus }) => {
            // Delete the focused attachment
            let Some(path) = files.get(focus).cloned() else {
                return Effect::none();
            };
            if let Some(Overlay::ImageList { files, focus, .. }) = model.top_overlay_mut() {
                files.retain(|p| p != &path);
                *focus = (*focus).min(files.len().saturating_sub(1));
            }
            Effect::from(Request::DeleteImage { id: bead, path })
        }
        _ => Effect::none(),
    }
}

fn merge_choice(model: &mut Model, c: char) -> Effect {
    if !matches!(model.top_overlay(), Some(Overlay::MergeChoice { .. })) {
        return Effect::none();
    }
    let Some(Overlay::MergeChoice { bead, .. }) = model.pop_overlay() else {
        return Effect::none();
    };
    match c {
        'm' | 'y' => Effect::from(Request::MergeAndAttach(bead)),
        's' => Effect::from(Request::AttachSession(bead)),
        _ => Effect::none(),
    }
}

enum DevIntent {
    Toggle,
    Restart,
    View,
}

fn dev_server_action(model: &mut Model, intent: DevIntent) -> Effect {
    let Some(id) = action_targets(model).pop() else {
        return leave_action_with_warning(model);
    };
    leave_action(model);

    let servers = model.dev_server_names.clone();
    match servers.len() {
        0 => toast(model, ToastLevel::Warning, "no dev servers configured"),
        1 => {
            let server = servers[0].clone();
            Effect::from(match intent {
                DevIntent::Toggle => Request::ToggleDevServer { id, server },
                DevIntent::Restart => Request::RestartDevServer { id, server },
                DevIntent::View => Request::ViewDevServer { id, server },
            })
        }
        _ => {
            // Several servers: pick one from the menu
            model.push_overlay(Overlay::DevServerMenu { bead: id, focus: 0 });
            Effect::none()
        }
    }
}

fn show_diff(model: &mut Model) -> Effect {
    let Some(id) = action_targets(model).pop() else {
        return leave_action_with_warning(model);
    };
    leave_action(model);
    model.push_overlay(Overlay::DiffViewer {
        bead: id.clone(),
        additions: 0,
        deletions: 0,
        files: Vec::new(),
    });
    Effect::from(Request::ShowDiff(id))
}

fn edit_bead(model: &mut Model) -> Effect {
    // From inside the detail overlay, switch it into edit mode
    if let Some(Overlay::Detail { bead, edit }) = model.top_overlay_mut() {
        if edit.is_none() {
            *edit = Some(DetailEdit {
                existing: Some(bead.id.clone()),
                title: bead.title.clone(),
                notes: bead.description.clone().unwrap_or_default(),
                field: DetailField::Title,
                with_assistant: false,
            });
        }
        return Effect::none();
    }

    let Some(id) = action_targets(model).pop() else {
        return leave_action_with_warning(model);
    };
    leave_action(model);
    let Some(bead) = model.bead(&id).cloned() else {
        return toast(model, ToastLevel::Warning, format!("bead not found: {id}"));
    };
    let edit = DetailEdit {
        existing: Some(bead.id.clone()),
        title: bead.title.clone(),
        notes: bead.description.clone().unwrap_or_default(),
        field: DetailField::Title,
        with_assistant: false,
    };
    model.push_overlay(Overlay::Detail {
        bead: Box::new(bead),
        edit: Some(edit),
    });
    Effect::none()
}

/// The optimistic move: apply the target status eagerly, remember the
/// pre-image, follow the task, and issue the request. Moving past the board
/// edge is a silent no-op that sends nothing.
fn move_task(model: &mut Model, delta: i8) -> Effect {
    let Some(id) = action_targets(model).pop() else {
        return leave_action_with_warning(model);
    };
    leave_action(model);

    let Some(bead) = model.bead(&id) else {
        return Effect::none();
    };
    let column = bead.status.column() as i8 + delta;
    let Some(target) = BeadStatus::from_column(column.clamp(0, 3) as usize) else {
        return Effect::none();
    };
    if target == bead.status {
        return Effect::none();
    }

    let pre = bead.status;
    model.pre_images.entry(id.clone()).or_insert(pre);
    if let Some(bead) = model.bead_mut(&id) {
        bead.status = target;
    }
    model.follow = Some(id.clone());
    model.clamp_cursor();
    Effect::from(Request::MoveTask { id, delta })
}

fn coord_event(model: &mut Model, event: UiMsg) -> Effect {
    match event {
        UiMsg::TasksUpdated(beads) => {
            model.beads = beads;
            model.clamp_cursor();
            Effect::none()
        }
        UiMsg::SessionStateChanged(id, state) => {
            if state.is_active() {
                model.sessions.insert(id, state);
            } else {
                model.sessions.remove(&id);
            }
            model.clamp_cursor();
            Effect::none()
        }
        UiMsg::DevServerStateChanged(id, server, status) => {
            use az_core::types::DevServerStatus;
            if status == DevServerStatus::Stopped {
                model.dev_servers.remove(&(id, server));
            } else {
                model.dev_servers.insert((id, server), status);
            }
            Effect::none()
        }
        UiMsg::Toast(message, level) => toast(model, level, message),
        UiMsg::RequestMergeChoice {
            id,
            behind,
            conflicts,
        } => {
            model.push_overlay(Overlay::MergeChoice {
                bead: id,
                behind,
                conflicts,
                in_progress: false,
            });
            Effect::none()
        }
        UiMsg::ProjectChanged(project) => {
            model.project = Some(project);
            Effect::none()
        }
        UiMsg::ProjectsUpdated(projects) => {
            model.projects = projects;
            Effect::none()
        }
        UiMsg::TaskMoveSucceeded(id, status) => {
            model.pre_images.remove(&id);
            if let Some(bead) = model.bead_mut(&id) {
                bead.status = status;
            }
            model.follow = Some(id);
            model.clamp_cursor();
            Effect::none()
        }
        UiMsg::TaskMoveFailed(id, error) => {
            if let Some(pre) = model.pre_images.remove(&id) {
                if let Some(bead) = model.bead_mut(&id) {
                    bead.status = pre;
                }
            }
            model.follow = Some(id.clone());
            model.clamp_cursor();
            toast(model, ToastLevel::Error, format!("move failed: {error}"))
        }
        UiMsg::SearchResults(ids) => {
            model.search_results = ids;
            Effect::none()
        }
        UiMsg::PlanningStateChanged(state) => {
            model.planning = state;
            if let Some(Overlay::Planning { state: s, .. }) = model.top_overlay_mut() {
                *s = state;
            }
            Effect::none()
        }
        UiMsg::Diagnostics(report) => {
            model.diagnostics = Some(report.clone());
            if let Some(Overlay::Diagnostics { report: r }) = model.top_overlay_mut() {
                *r = Some(report);
            }
            Effect::none()
        }
        UiMsg::DiffReady {
            id,
            additions,
            deletions,
            files,
        } => {
            if let Some(Overlay::DiffViewer {
                bead,
                additions: a,
                deletions: d,
                files: f,
            }) = model.top_overlay_mut()
            {
                if *bead == id {
                    *a = additions;
                    *d = deletions;
                    *f = files;
                }
            }
            Effect::none()
        }
        UiMsg::QuitApproved => Effect::Quit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_core::types::{Priority, SessionState};
    use az_store::bead::test_support::bead;
    use chrono::TimeZone;

    fn fixed_now() -> az_core::types::Timestamp {
        chrono::Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn model_with(beads: Vec<az_store::Bead>) -> Model {
        let mut model = Model::new(fixed_now());
        model.beads = beads;
        model
    }

    fn board_model() -> Model {
        model_with(vec![
            bead("az-1", "alpha", BeadStatus::Open),
            bead("az-2", "beta", BeadStatus::Open),
            bead("az-3", "gamma", BeadStatus::InProgress),
        ])
    }

    /// Snapshot of the non-mode fields for invariance checks.
    fn non_mode_snapshot(model: &Model) -> (Vec<az_store::Bead>, Cursor, az_store::FilterState) {
        (model.beads.clone(), model.cursor, model.filters.clone())
    }

    #[test]
    fn test_cursor_movement_and_clamping() {
        let mut model = board_model();
        update(&mut model, Msg::MoveCursor { dx: 0, dy: 1 });
        assert_eq!(model.cursor, Cursor { column: 0, task: 1 });
        // Bottom clamp
        update(&mut model, Msg::MoveCursor { dx: 0, dy: 5 });
        assert_eq!(model.cursor.task, 1);
        // Left edge clamp
        update(&mut model, Msg::MoveCursor { dx: -1, dy: 0 });
        assert_eq!(model.cursor.column, 0);
    }

    #[test]
    fn test_optimistic_move_applies_immediately() {
        let mut model = board_model();
        model.mode = Mode::Action {
            task_id: "az-1".into(),
        };
        model.push_overlay(Overlay::ActionMenu);

        let effect = update(&mut model, Msg::MoveTask(1));

        // The bead renders in column 1 before any backend confirmation
        assert_eq!(model.bead(&"az-1".to_string()).unwrap().status, BeadStatus::InProgress);
        assert_eq!(model.pre_images.get("az-1"), Some(&BeadStatus::Open));
        // Exactly one MoveTask request was issued
        let requests = effect.requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(
            requests[0],
            Request::MoveTask { id, delta: 1 } if id == "az-1"
        ));
        // Cursor follows the task into its new column
        assert_eq!(model.cursor.column, 1);
    }

    #[test]
    fn test_move_success_clears_pre_image() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        update(&mut model, Msg::MoveTask(1));

        update(
            &mut model,
            Msg::Coord(UiMsg::TaskMoveSucceeded("az-1".into(), BeadStatus::InProgress)),
        );
        assert!(model.pre_images.is_empty());
        assert_eq!(model.bead(&"az-1".to_string()).unwrap().status, BeadStatus::InProgress);
    }

    #[test]
    fn test_move_failure_rolls_back_and_toasts() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        update(&mut model, Msg::MoveTask(1));

        let effect = update(
            &mut model,
            Msg::Coord(UiMsg::TaskMoveFailed("az-1".into(), "boom".into())),
        );
        // Rolled back to column 0
        assert_eq!(model.bead(&"az-1".to_string()).unwrap().status, BeadStatus::Open);
        assert!(model.pre_images.is_empty());
        // An error toast mentioning the failure is visible
        assert!(model.toasts.items().iter().any(|t| t.message.contains("boom")));
        assert!(matches!(effect, Effect::ToastTimer { .. }));
    }

    #[test]
    fn test_move_at_edge_is_silent_noop() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);

        let effect = update(&mut model, Msg::MoveTask(-1));
        assert!(effect.requests().is_empty());
        assert_eq!(model.bead(&"az-1".to_string()).unwrap().status, BeadStatus::Open);
        assert!(model.pre_images.is_empty());
    }

    #[test]
    fn test_action_captures_task_despite_cursor_motion() {
        let mut model = board_model();
        // Open the action menu on az-1
        update(&mut model, Msg::OpenActionMenu);
        assert!(matches!(&model.mode, Mode::Action { task_id } if task_id == "az-1"));
        // The action applies to the captured id, not the cursor
        let effect = update(&mut model, Msg::StartSession { with_work: false, yolo: false });
        assert!(matches!(
            effect.requests()[0],
            Request::StartSession { id, .. } if id == "az-1"
        ));
        // Menu closed, back to Normal
        assert!(model.overlays.is_empty());
        assert!(matches!(model.mode, Mode::Normal));
    }

    #[test]
    fn test_select_then_exit_preserves_non_mode_fields() {
        let mut model = board_model();
        let before = non_mode_snapshot(&model);
        update(&mut model, Msg::EnterSelect);
        assert!(matches!(&model.mode, Mode::Select { selected } if selected.len() == 1));
        update(&mut model, Msg::ExitMode);
        assert!(matches!(model.mode, Mode::Normal));
        assert_eq!(non_mode_snapshot(&model), before);
    }

    #[test]
    fn test_select_mode_batches_requests() {
        let mut model = board_model();
        update(&mut model, Msg::EnterSelect);
        update(&mut model, Msg::MoveCursor { dx: 0, dy: 1 });
        update(&mut model, Msg::ToggleSelect);
        // az-1 and az-2 both selected
        let effect = update(&mut model, Msg::StartSession { with_work: false, yolo: false });
        assert_eq!(effect.requests().len(), 2);
    }

    #[test]
    fn test_jump_navigation_scenario() {
        // 12 visible tasks, user types g w a c
        let beads: Vec<_> = (0..12)
            .map(|i| bead(&format!("az-{i}"), "t", BeadStatus::Open))
            .collect();
        let mut model = model_with(beads);

        update(&mut model, Msg::EnterGoto);
        assert!(matches!(model.mode, Mode::Goto(GotoState::Pending)));

        update(&mut model, Msg::GotoKey('w'));
        match &model.mode {
            Mode::Goto(GotoState::Jump { labels, pending }) => {
                assert_eq!(labels.len(), 12);
                assert_eq!(labels[0].0, "aa");
                assert_eq!(labels[11].0, "al");
                assert!(pending.is_none());
            }
            other => panic!("expected jump mode, got {other:?}"),
        }

        update(&mut model, Msg::GotoKey('a'));
        assert!(matches!(
            &model.mode,
            Mode::Goto(GotoState::Jump { pending: Some('a'), .. })
        ));

        update(&mut model, Msg::GotoKey('c'));
        assert!(matches!(model.mode, Mode::Normal));
        // Label "ac" is the third task in visual order
        assert_eq!(model.cursor, Cursor { column: 0, task: 2 });
    }

    #[test]
    fn test_goto_top_and_bottom() {
        let mut model = board_model();
        model.cursor = Cursor { column: 0, task: 1 };
        update(&mut model, Msg::EnterGoto);
        update(&mut model, Msg::GotoKey('e'));
        assert_eq!(model.cursor.task, 1); // bottom of a 2-task column
        update(&mut model, Msg::EnterGoto);
        update(&mut model, Msg::GotoKey('g'));
        assert_eq!(model.cursor.task, 0);
        assert!(matches!(model.mode, Mode::Normal));
    }

    #[test]
    fn test_filter_toggle_round_trip() {
        let mut model = board_model();
        let before = model.filters.clone();
        update(&mut model, Msg::ToggleFilterStatus(BeadStatus::Open));
        update(&mut model, Msg::ToggleFilterStatus(BeadStatus::Open));
        assert_eq!(model.filters, before);
    }

    #[test]
    fn test_clear_filters_after_toggles() {
        let mut model = board_model();
        update(&mut model, Msg::ToggleFilterStatus(BeadStatus::Open));
        update(&mut model, Msg::ToggleFilterPriority(Priority::P1));
        update(&mut model, Msg::ToggleHideEpicChildren);
        update(&mut model, Msg::ClearFilters);
        assert!(model.filters.is_clear());
        assert!(!model.filters.hide_epic_children);
    }

    #[test]
    fn test_search_input_edits_query() {
        let mut model = board_model();
        update(&mut model, Msg::EnterSearch);
        update(&mut model, Msg::InputChar('g'));
        update(&mut model, Msg::InputChar('a'));
        assert_eq!(model.filters.query, "ga");
        // Backspace then retype restores the buffer
        update(&mut model, Msg::InputBackspace);
        update(&mut model, Msg::InputChar('a'));
        assert_eq!(model.filters.query, "ga");
        // Commit keeps the query applied
        update(&mut model, Msg::InputCommit);
        assert!(matches!(model.mode, Mode::Normal));
        assert_eq!(model.filters.query, "ga");
    }

    #[test]
    fn test_overlay_close_restores_normal_mode() {
        let mut model = board_model();
        update(&mut model, Msg::EnterFilterMenu);
        assert!(matches!(model.mode, Mode::Filter));
        update(&mut model, Msg::OverlayKeyFilter('s'));
        assert_eq!(model.overlays.len(), 2);
        update(&mut model, Msg::CloseOverlay);
        assert_eq!(model.overlays.len(), 1);
        // Mode survives while the parent menu is still up
        assert!(matches!(model.mode, Mode::Filter));
        update(&mut model, Msg::CloseOverlay);
        assert!(model.overlays.is_empty());
        assert!(matches!(model.mode, Mode::Normal));
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);

        let effect = update(&mut model, Msg::RequestDeleteBead);
        assert!(effect.requests().is_empty());
        assert!(matches!(
            model.top_overlay(),
            Some(Overlay::ConfirmDialog {
                pending: PendingAction::DeleteBead(_)
            })
        ));

        // y executes the pending action's effect
        let effect = update(&mut model, Msg::Confirm);
        assert!(matches!(effect.requests()[0], Request::DeleteBead(id) if id == "az-1"));
        assert!(model.overlays.is_empty());
    }

    #[test]
    fn test_confirm_dialog_deny_sends_nothing() {
        let mut model = board_model();
        model.push_overlay(Overlay::ConfirmDialog {
            pending: PendingAction::Cleanup("az-1".into()),
        });
        let effect = update(&mut model, Msg::Deny);
        assert!(effect.requests().is_empty());
        assert!(model.overlays.is_empty());
    }

    #[test]
    fn test_merge_choice_dialog_flow() {
        let mut model = board_model();
        // Coordinator reports conflicts; the dialog opens with the summary
        update(
            &mut model,
            Msg::Coord(UiMsg::RequestMergeChoice {
                id: "az-1".into(),
                behind: 3,
                conflicts: vec!["src/a.txt".into()],
            }),
        );
        assert!(matches!(
            model.top_overlay(),
            Some(Overlay::MergeChoice { behind: 3, .. })
        ));

        // m merges inside the session
        let effect = update(&mut model, Msg::MergeChoiceKey('m'));
        assert!(matches!(effect.requests()[0], Request::MergeAndAttach(id) if id == "az-1"));
        assert!(model.overlays.is_empty());

        // s only attaches
        update(
            &mut model,
            Msg::Coord(UiMsg::RequestMergeChoice {
                id: "az-1".into(),
                behind: 3,
                conflicts: vec![],
            }),
        );
        let effect = update(&mut model, Msg::MergeChoiceKey('s'));
        assert!(matches!(effect.requests()[0], Request::AttachSession(id) if id == "az-1"));

        // n dismisses without a request
        update(
            &mut model,
            Msg::Coord(UiMsg::RequestMergeChoice {
                id: "az-1".into(),
                behind: 3,
                conflicts: vec![],
            }),
        );
        let effect = update(&mut model, Msg::MergeChoiceKey('n'));
        assert!(effect.requests().is_empty());
    }

    #[test]
    fn test_quit_request_goes_through_coordinator() {
        let mut model = board_model();
        let effect = update(&mut model, Msg::QuitRequested);
        assert!(matches!(effect.requests()[0], Request::RequestQuit));
        assert!(!effect.quits());

        // Refusal arrives as a warning toast; the UI keeps running
        let effect = update(
            &mut model,
            Msg::Coord(UiMsg::Toast(
                "Cannot quit: merge in progress".into(),
                ToastLevel::Warning,
            )),
        );
        assert!(!effect.quits());
        assert!(model.toasts.items()[0].message.contains("Cannot quit"));

        // Approval exits
        let effect = update(&mut model, Msg::Coord(UiMsg::QuitApproved));
        assert!(effect.quits());
    }

    #[test]
    fn test_session_state_changes_update_mirror() {
        let mut model = board_model();
        update(
            &mut model,
            Msg::Coord(UiMsg::SessionStateChanged("az-1".into(), SessionState::Busy)),
        );
        assert_eq!(model.session_state(&"az-1".to_string()), SessionState::Busy);
        // Idle removes the entry entirely
        update(
            &mut model,
            Msg::Coord(UiMsg::SessionStateChanged("az-1".into(), SessionState::Idle)),
        );
        assert!(model.sessions.is_empty());
    }

    #[test]
    fn test_tasks_updated_reclamps_cursor() {
        let mut model = board_model();
        model.cursor = Cursor { column: 0, task: 1 };
        update(
            &mut model,
            Msg::Coord(UiMsg::TasksUpdated(vec![bead("az-9", "only", BeadStatus::Open)])),
        );
        assert_eq!(model.cursor, Cursor { column: 0, task: 0 });
        assert_eq!(model.beads.len(), 1);
    }

    #[test]
    fn test_toast_expiry_dispatch() {
        let mut model = board_model();
        let effect = update(
            &mut model,
            Msg::Coord(UiMsg::Toast("hello".into(), ToastLevel::Info)),
        );
        let id = match effect {
            Effect::ToastTimer { id, after } => {
                assert_eq!(after.as_secs(), 5);
                id
            }
            other => panic!("expected toast timer, got {other:?}"),
        };
        assert_eq!(model.toasts.items().len(), 1);
        update(&mut model, Msg::ToastExpired(id));
        assert!(model.toasts.is_empty());
    }

    #[test]
    fn test_tick_polls_subscription() {
        let mut model = board_model();
        let effect = update(&mut model, Msg::Tick);
        assert!(matches!(effect, Effect::PollEvents));
    }

    #[test]
    fn test_create_bead_form_commit() {
        let mut model = board_model();
        update(&mut model, Msg::CreateBead { with_assistant: false });
        for c in "fix it".chars() {
            update(&mut model, Msg::InputChar(c));
        }
        let effect = update(&mut model, Msg::InputCommit);
        match effect.requests()[0] {
            Request::CreateBead(draft) => assert_eq!(draft.title, "fix it"),
            other => panic!("unexpected request: {other:?}"),
        }
        assert!(model.overlays.is_empty());
    }

    #[test]
    fn test_create_with_assistant_uses_start_variant() {
        let mut model = board_model();
        update(&mut model, Msg::CreateBead { with_assistant: true });
        update(&mut model, Msg::InputChar('x'));
        let effect = update(&mut model, Msg::InputCommit);
        assert!(matches!(effect.requests()[0], Request::CreateBeadAndStart(_)));
    }

    #[test]
    fn test_create_bead_requires_title() {
        let mut model = board_model();
        update(&mut model, Msg::CreateBead { with_assistant: false });
        let effect = update(&mut model, Msg::InputCommit);
        assert!(effect.requests().is_empty());
        // Still in the form, warning toast shown
        assert!(matches!(model.top_overlay(), Some(Overlay::Detail { .. })));
        assert!(!model.toasts.is_empty());
    }

    #[test]
    fn test_edit_bead_commit_patches_title() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        update(&mut model, Msg::EditBead);
        assert!(matches!(
            model.top_overlay(),
            Some(Overlay::Detail { edit: Some(_), .. })
        ));
        update(&mut model, Msg::InputChar('!'));
        let effect = update(&mut model, Msg::InputCommit);
        match effect.requests()[0] {
            Request::EditBead { id, patch } => {
                assert_eq!(id, "az-1");
                assert_eq!(patch.title.as_deref(), Some("alpha!"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_image_attach_empty_input_pastes() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        update(&mut model, Msg::AttachImage);
        let effect = update(&mut model, Msg::InputCommit);
        assert!(matches!(effect.requests()[0], Request::PasteImage(id) if id == "az-1"));
    }

    #[test]
    fn test_image_attach_path_input() {
        let mut model = board_model();
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        update(&mut model, Msg::AttachImage);
        for c in "/tmp/shot.png".chars() {
            update(&mut model, Msg::InputChar(c));
        }
        let effect = update(&mut model, Msg::InputCommit);
        match effect.requests()[0] {
            Request::AttachFile { id, path } => {
                assert_eq!(id, "az-1");
                assert_eq!(path, &std::path::PathBuf::from("/tmp/shot.png"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_project_selection() {
        let mut model = board_model();
        model.projects = vec![
            az_core::projects::Project { name: "a".into(), path: "/a".into() },
            az_core::projects::Project { name: "b".into(), path: "/b".into() },
        ];
        update(&mut model, Msg::OpenProjectSelector);
        update(&mut model, Msg::OverlayDown);
        let effect = update(&mut model, Msg::OverlaySelect);
        match effect.requests()[0] {
            Request::SwitchProject(path) => assert_eq!(path, &std::path::PathBuf::from("/b")),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_orchestrate_starts_children() {
        let mut epic = bead("az-e", "epic", BeadStatus::Open);
        epic.issue_type = IssueType::Epic;
        let mut c1 = bead("az-c1", "one", BeadStatus::Open);
        c1.parent = Some("az-e".into());
        let mut c2 = bead("az-c2", "two", BeadStatus::Open);
        c2.parent = Some("az-e".into());
        let mut model = model_with(vec![epic, c1, c2]);

        update(&mut model, Msg::EnterOrchestrate);
        assert!(matches!(model.mode, Mode::Orchestrate { .. }));
        update(&mut model, Msg::OrchestrateKey(' '));
        update(&mut model, Msg::OrchestrateKey('j'));
        update(&mut model, Msg::OrchestrateKey(' '));
        let effect = update(&mut model, Msg::OrchestrateKey('s'));
        assert_eq!(effect.requests().len(), 2);
        assert!(matches!(model.mode, Mode::Normal));
    }

    #[test]
    fn test_merge_select_from_selection() {
        let mut model = board_model();
        update(&mut model, Msg::EnterSelect);
        update(&mut model, Msg::MoveCursor { dx: 0, dy: 1 });
        update(&mut model, Msg::ToggleSelect);
        update(&mut model, Msg::MergeSelectKey('m'));
        assert!(matches!(model.mode, Mode::MergeSelect { .. }));
        update(&mut model, Msg::MergeSelectKey('j'));
        let effect = update(&mut model, Msg::MergeSelectKey('\n'));
        assert_eq!(effect.requests().len(), 1);
        assert!(matches!(effect.requests()[0], Request::MergeToMain(_)));
        assert!(matches!(model.mode, Mode::Normal));
    }

    #[test]
    fn test_planning_commit() {
        let mut model = board_model();
        update(&mut model, Msg::OpenPlanning);
        for c in "build a thing".chars() {
            update(&mut model, Msg::InputChar(c));
        }
        let effect = update(&mut model, Msg::InputCommit);
        match effect.requests()[0] {
            Request::RunPlanning(desc) => assert_eq!(desc, "build a thing"),
            other => panic!("unexpected request: {other:?}"),
        }
        assert_eq!(model.planning, PlanningState::Generating);
    }

    #[test]
    fn test_dev_server_single_definition_goes_direct() {
        let mut model = board_model();
        model.dev_server_names = vec!["web".into()];
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        let effect = update(&mut model, Msg::DevServerToggle);
        assert!(matches!(
            effect.requests()[0],
            Request::ToggleDevServer { id, server } if id == "az-1" && server == "web"
        ));
    }

    #[test]
    fn test_dev_server_multiple_definitions_open_menu() {
        let mut model = board_model();
        model.dev_server_names = vec!["web".into(), "api".into()];
        model.mode = Mode::Action { task_id: "az-1".into() };
        model.push_overlay(Overlay::ActionMenu);
        let effect = update(&mut model, Msg::DevServerToggle);
        assert!(effect.requests().is_empty());
        assert!(matches!(model.top_overlay(), Some(Overlay::DevServerMenu { .. })));
    }
}
