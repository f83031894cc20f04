//! Rendering: model in, frames out. No state lives here.

use az_coord::{PlanningState, ToastLevel};
use az_store::Bead;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::input::KEYBINDINGS;
use crate::mode::{DetailField, GotoState, Mode, Overlay};
use crate::model::{Model, jump_labels};
use crate::theme::Theme;

/// Column titles in board order.
const COLUMN_TITLES: [&str; 4] = ["Open", "In Progress", "Review", "Done"];

/// Draw one frame.
pub fn draw(frame: &mut Frame, model: &Model) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(5),    // Board
            Constraint::Length(1), // Footer
        ])
        .split(area);

    draw_header(frame, chunks[0], model);
    draw_board(frame, chunks[1], model);
    draw_footer(frame, chunks[2], model);

    for overlay in &model.overlays {
        draw_overlay(frame, area, model, overlay);
    }
    draw_toasts(frame, area, model);
}

fn draw_header(frame: &mut Frame, area: Rect, model: &Model) {
    let theme = &model.theme;
    let project = model
        .project
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or("no project");

    let mut spans = vec![
        Span::styled(
            " azedarach ",
            Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("[{project}] "), Style::default().fg(theme.text)),
        Span::styled(
            format!("-- {} -- ", model.mode.tag()),
            Style::default().fg(theme.hotkey),
        ),
    ];
    if !model.filters.query.is_empty() {
        spans.push(Span::styled(
            format!("/{} ", model.filters.query),
            Style::default().fg(theme.waiting),
        ));
    }
    let active = model.filters.active_count();
    if active > 0 {
        spans.push(Span::styled(
            format!("({active} filters) "),
            Style::default().fg(theme.text_dim),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_board(frame: &mut Frame, area: Rect, model: &Model) {
    let board = model.board();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(area);

    // Jump labels index into the visual order across all columns
    let labels: Vec<String> = match &model.mode {
        Mode::Goto(GotoState::Jump { labels, .. }) => {
            labels.iter().map(|(l, _)| l.clone()).collect()
        }
        _ => jump_labels(0),
    };
    let mut label_iter = labels.iter();

    for (index, column) in board.iter().enumerate() {
        draw_column(
            frame,
            columns[index],
            model,
            index,
            column,
            &mut label_iter,
        );
    }
}

fn draw_column<'a>(
    frame: &mut Frame,
    area: Rect,
    model: &Model,
    index: usize,
    beads: &[&Bead],
    labels: &mut impl Iterator<Item = &'a String>,
) {
    let theme = &model.theme;
    let focused = model.cursor.column == index;
    let border_style = if focused {
        Style::default().fg(theme.header)
    } else {
        Style::default().fg(theme.border_dim)
    };
    let title = format!(" {} ({}) ", COLUMN_TITLES[index], beads.len());

    let items: Vec<ListItem> = beads
        .iter()
        .enumerate()
        .map(|(task_index, bead)| {
            let label = labels.next();
            card(model, bead, label, focused && model.cursor.task == task_index)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(title, Style::default().fg(theme.header))),
    );
    frame.render_widget(list, area);
}

fn card<'a>(
    model: &Model,
    bead: &Bead,
    jump_label: Option<&String>,
    under_cursor: bool,
) -> ListItem<'a> {
    let theme = &model.theme;
    let session = model.session_state(&bead.id);
    let selected = match &model.mode {
        Mode::Select { selected } => selected.contains(&bead.id),
        _ => false,
    };

    let mut spans = Vec::new();
    if let Some(label) = jump_label {
        spans.push(Span::styled(
            format!("{label} "),
            Style::default()
                .fg(theme.jump_label)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if selected {
        spans.push(Span::styled("▌", Style::default().fg(theme.selected)));
    }
    spans.push(Span::styled(
        format!("{} ", session.indicator()),
        Style::default().fg(session_color(theme, session)),
    ));
    spans.push(Span::styled(
        format!("{} ", bead.id),
        Style::default().fg(theme.text_dim),
    ));
    spans.push(Span::styled(
        format!("{} ", bead.priority),
        Style::default().fg(priority_color(theme, bead)),
    ));

    let mut lines = vec![Line::from(spans)];
    if !model.compact {
        lines.push(Line::from(Span::styled(
            format!("  {}", truncate(&bead.title, 40)),
            Style::default().fg(theme.text),
        )));
    } else if let Some(first) = lines.first_mut() {
        first.spans.push(Span::styled(
            truncate(&bead.title, 24),
            Style::default().fg(theme.text),
        ));
    }

    let style = if under_cursor {
        Style::default().bg(theme.cursor_bg)
    } else {
        Style::default()
    };
    ListItem::new(lines).style(style)
}

fn session_color(theme: &Theme, state: az_core::types::SessionState) -> ratatui::style::Color {
    use az_core::types::SessionState::*;
    match state {
        Busy => theme.busy,
        Waiting => theme.waiting,
        Paused => theme.text_dim,
        Done => theme.success,
        Error => theme.error,
        Idle => theme.border_dim,
    }
}

fn priority_color(theme: &Theme, bead: &Bead) -> ratatui::style::Color {
    use az_core::types::Priority::*;
    match bead.priority {
        P0 => theme.error,
        P1 => theme.warning,
        _ => theme.text_dim,
    }
}

fn draw_footer(frame: &mut Frame, area: Rect, model: &Model) {
    let theme = &model.theme;
    let hints: &[(&str, &str)] = match &model.mode {
        Mode::Normal => &[
            ("hjkl", "move"),
            ("space", "actions"),
            ("v", "select"),
            ("g", "goto"),
            ("/", "search"),
            ("f", "filter"),
            (",", "sort"),
            ("c", "create"),
            ("?", "help"),
            ("q", "quit"),
        ],
        Mode::Select { .. } => &[("space", "toggle"), ("m", "merge"), ("esc", "done")],
        Mode::Goto(_) => &[("g/e/h/l/p", "jump"), ("w", "labels"), ("esc", "cancel")],
        Mode::Search => &[("enter", "apply"), ("esc", "cancel")],
        _ => &[("esc", "back")],
    };

    let mut spans = Vec::new();
    for (key, action) in hints {
        spans.push(Span::styled(
            format!("[{key}]"),
            Style::default().fg(theme.hotkey),
        ));
        spans.push(Span::styled(
            format!("{action} "),
            Style::default().fg(theme.text_dim),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_toasts(frame: &mut Frame, area: Rect, model: &Model) {
    let theme = &model.theme;
    for (index, toast) in model.toasts.items().iter().rev().enumerate() {
        let width = (toast.message.len() as u16 + 4).min(area.width.saturating_sub(2));
        let rect = Rect {
            x: area.width.saturating_sub(width + 1),
            y: area.height.saturating_sub(4 + 3 * index as u16),
            width,
            height: 3,
        };
        if rect.y == 0 {
            break;
        }
        let color = match toast.level {
            ToastLevel::Info => theme.text,
            ToastLevel::Success => theme.success,
            ToastLevel::Warning => theme.warning,
            ToastLevel::Error => theme.error,
        };
        frame.render_widget(Clear, rect);
        frame.render_widget(
            Paragraph::new(toast.message.clone())
                .style(Style::default().fg(color))
                .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))),
            rect,
        );
    }
}

// =========================================================================
// Overlays
// =========================================================================

fn draw_overlay(frame: &mut Frame, area: Rect, model: &Model, overlay: &Overlay) {
    let theme = &model.theme;
    let rect = match overlay {
        Overlay::ConfirmDialog { .. } | Overlay::MergeChoice { .. } => centered_rect(area, 60, 30),
        Overlay::ActionMenu | Overlay::SortMenu => centered_rect(area, 40, 60),
        Overlay::Help | Overlay::Detail { .. } | Overlay::Logs { .. } => centered_rect(area, 80, 80),
        _ => centered_rect(area, 60, 60),
    };
    frame.render_widget(Clear, rect);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.header))
        .title(Span::styled(
            format!(" {} ", overlay.title()),
            Style::default().fg(theme.header).add_modifier(Modifier::BOLD),
        ));

    let lines = overlay_lines(model, overlay);
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(block),
        rect,
    );
}

fn overlay_lines<'a>(model: &Model, overlay: &Overlay) -> Vec<Line<'a>> {
    let theme = &model.theme;
    let dim = Style::default().fg(theme.text_dim);
    let text = Style::default().fg(theme.text);
    let key = Style::default().fg(theme.hotkey);

    match overlay {
        Overlay::ActionMenu => vec![
            menu_line(theme, "s/S/!", "start / start with work / start yolo"),
            menu_line(theme, "a", "attach session"),
            menu_line(theme, "p/R/x", "pause / resume / stop"),
            menu_line(theme, "r/^R/v", "dev server toggle / restart / view"),
            menu_line(theme, "u", "update from main"),
            menu_line(theme, "m/M", "merge / abort merge"),
            menu_line(theme, "f", "diff"),
            menu_line(theme, "P", "create PR"),
            menu_line(theme, "d/D", "cleanup / delete"),
            menu_line(theme, "e", "edit"),
            menu_line(theme, "i/I", "attach image / attachments"),
            menu_line(theme, "h/l", "move left / right"),
        ],
        Overlay::SortMenu => vec![
            menu_line(theme, "s", "session state"),
            menu_line(theme, "p", "priority"),
            menu_line(theme, "u", "updated"),
        ],
        Overlay::FilterMenu => vec![
            menu_line(theme, "s", "status"),
            menu_line(theme, "p", "priority"),
            menu_line(theme, "t", "type"),
            menu_line(theme, "S", "session state"),
            menu_line(theme, "e", "hide epic children"),
            menu_line(theme, "a", "age"),
            menu_line(theme, "c", "clear all"),
        ],
        Overlay::FilterStatusMenu => vec![
            menu_line(theme, "o", "open"),
            menu_line(theme, "i", "in progress"),
            menu_line(theme, "r", "review"),
            menu_line(theme, "d", "done"),
        ],
        Overlay::FilterPriorityMenu => vec![menu_line(theme, "0-4", "toggle priority")],
        Overlay::FilterTypeMenu => vec![
            menu_line(theme, "t", "task"),
            menu_line(theme, "b", "bug"),
            menu_line(theme, "f", "feature"),
            menu_line(theme, "e", "epic"),
            menu_line(theme, "c", "chore"),
        ],
        Overlay::FilterSessionMenu => vec![
            menu_line(theme, "i", "idle"),
            menu_line(theme, "b", "busy"),
            menu_line(theme, "w", "waiting"),
            menu_line(theme, "p", "paused"),
            menu_line(theme, "d", "done"),
            menu_line(theme, "e", "error"),
        ],
        Overlay::Help => KEYBINDINGS
            .iter()
            .map(|binding| {
                Line::from(vec![
                    Span::styled(format!("{:<18}", binding.key), key),
                    Span::styled(format!("{:<10}", binding.mode), dim),
                    Span::styled(binding.description.to_string(), text),
                ])
            })
            .collect(),
        Overlay::Settings { .. } => settings_lines(model),
        Overlay::Diagnostics { report } => match report {
            None => vec![Line::from(Span::styled("Collecting...", dim))],
            Some(report) => vec![
                kv_line(theme, "bd", report.bd_version.as_deref().unwrap_or("not found")),
                kv_line(theme, "git", report.git_version.as_deref().unwrap_or("not found")),
                kv_line(theme, "tmux", report.tmux_version.as_deref().unwrap_or("not found")),
                kv_line(theme, "project", &report.project_name),
                kv_line(theme, "path", &report.project_path.display().to_string()),
                kv_line(theme, "worktrees", &report.worktree_base.display().to_string()),
                kv_line(theme, "log", &report.log_file.display().to_string()),
            ],
        },
        Overlay::Logs { lines, scroll } => lines
            .iter()
            .skip(*scroll)
            .map(|l| Line::from(Span::styled(l.clone(), text)))
            .collect(),
        Overlay::ProjectSelector { focus } => model
            .projects
            .iter()
            .enumerate()
            .map(|(i, project)| {
                let style = if i == *focus { text.add_modifier(Modifier::REVERSED) } else { text };
                Line::from(Span::styled(
                    format!("{} ({})", project.name, project.path.display()),
                    style,
                ))
            })
            .collect(),
        Overlay::Detail { bead, edit } => detail_lines(model, bead, edit.as_ref()),
        Overlay::ImageAttach { input, .. } => vec![
            Line::from(Span::styled(
                "Path to attach (empty pastes from clipboard):",
                dim,
            )),
            Line::from(Span::styled(format!("> {input}█"), text)),
        ],
        Overlay::ImageList { files, focus, .. } => {
            if files.is_empty() {
                vec![Line::from(Span::styled("no attachments", dim))]
            } else {
                files
                    .iter()
                    .enumerate()
                    .map(|(i, file)| {
                        let style =
                            if i == *focus { text.add_modifier(Modifier::REVERSED) } else { text };
                        Line::from(Span::styled(
                            file.file_name().unwrap_or_default().to_string_lossy().into_owned(),
                            style,
                        ))
                    })
                    .collect()
            }
        }
        Overlay::ImagePreview { path } => vec![
            Line::from(Span::styled(path.display().to_string(), text)),
            Line::from(Span::styled("(opens in external viewer)", dim)),
        ],
        Overlay::DevServerMenu { bead, focus } => model
            .dev_server_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let status = model
                    .dev_servers
                    .get(&(bead.clone(), name.clone()))
                    .copied()
                    .unwrap_or_default();
                let style = if i == *focus { text.add_modifier(Modifier::REVERSED) } else { text };
                Line::from(Span::styled(format!("{name} [{status}]"), style))
            })
            .collect(),
        Overlay::DiffViewer { bead, additions, deletions, files } => {
            let mut lines = vec![kv_line(
                theme,
                bead,
                &format!("+{additions} -{deletions}"),
            )];
            lines.extend(files.iter().map(|f| Line::from(Span::styled(f.clone(), text))));
            lines
        }
        Overlay::MergeChoice { bead, behind, conflicts, .. } => {
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("{bead} is {behind} commit(s) behind; merging will conflict:"),
                    text,
                )),
                Line::default(),
            ];
            lines.extend(
                conflicts
                    .iter()
                    .map(|f| Line::from(Span::styled(format!("  {f}"), Style::default().fg(theme.error)))),
            );
            lines.push(Line::default());
            lines.push(menu_line(theme, "m/y", "merge in session"));
            lines.push(menu_line(theme, "s", "attach session"));
            lines.push(menu_line(theme, "n/esc", "cancel"));
            lines
        }
        Overlay::ConfirmDialog { pending } => vec![
            Line::from(Span::styled(pending.prompt(), text)),
            Line::default(),
            menu_line(theme, "y/enter", "confirm"),
            menu_line(theme, "n/esc", "cancel"),
        ],
        Overlay::Planning { state, input } => {
            let mut lines = vec![Line::from(Span::styled(state.label().to_string(), text))];
            if *state == PlanningState::Input {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(format!("> {input}█"), text)));
            } else {
                lines.push(menu_line(theme, "a", "attach planning session"));
            }
            lines
        }
    }
}

fn settings_lines<'a>(model: &Model) -> Vec<Line<'a>> {
    let theme = &model.theme;
    let mut lines = vec![
        kv_line(theme, "theme", theme.name.display_name()),
        kv_line(
            theme,
            "project",
            &model
                .project
                .as_ref()
                .map(|p| p.path.display().to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        kv_line(theme, "sort", model.sort.label()),
        kv_line(theme, "filters", &model.filters.active_count().to_string()),
    ];
    for (key, value) in &model.settings_rows {
        lines.push(kv_line(theme, key, value));
    }
    lines
}

fn detail_lines<'a>(
    model: &Model,
    bead: &Bead,
    edit: Option<&crate::mode::DetailEdit>,
) -> Vec<Line<'a>> {
    let theme = &model.theme;
    let text = Style::default().fg(theme.text);
    let dim = Style::default().fg(theme.text_dim);

    match edit {
        Some(edit) => {
            let marker = |field: DetailField| {
                if edit.field == field { "█" } else { "" }
            };
            vec![
                kv_line(theme, "title", &format!("{}{}", edit.title, marker(DetailField::Title))),
                kv_line(theme, "notes", &format!("{}{}", edit.notes, marker(DetailField::Notes))),
                Line::default(),
                Line::from(Span::styled("tab switches field, enter saves", dim)),
            ]
        }
        None => {
            let session = model.session_state(&bead.id);
            let mut lines = vec![
                kv_line(theme, "id", &bead.id),
                kv_line(theme, "title", &bead.title),
                kv_line(theme, "status", &bead.status.to_string()),
                kv_line(theme, "priority", &bead.priority.to_string()),
                kv_line(theme, "type", &bead.issue_type.to_string()),
                kv_line(theme, "session", session.label()),
                kv_line(theme, "updated", &bead.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ];
            if let Some(parent) = &bead.parent {
                lines.push(kv_line(theme, "epic", parent));
            }
            if let Some(description) = &bead.description {
                lines.push(Line::default());
                lines.extend(
                    description
                        .lines()
                        .map(|l| Line::from(Span::styled(l.to_string(), text))),
                );
            }
            if let Some(design) = &bead.design {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled("design:", dim)));
                lines.extend(
                    design
                        .lines()
                        .map(|l| Line::from(Span::styled(l.to_string(), text))),
                );
            }
            lines
        }
    }
}

fn menu_line<'a>(theme: &Theme, keys: &str, action: &str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {keys:<8}"), Style::default().fg(theme.hotkey)),
        Span::styled(action.to_string(), Style::default().fg(theme.text)),
    ])
}

fn kv_line<'a>(theme: &Theme, key: &str, value: &str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("{key:>10}: "), Style::default().fg(theme.text_dim)),
        Span::styled(value.to_string(), Style::default().fg(theme.text)),
    ])
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// A centered sub-rectangle sized as percentages of the parent.
fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
