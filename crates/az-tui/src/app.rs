//! The runtime: terminal lifecycle, the 60 Hz tick, and effect
//! interpretation against the coordinator.
//!
//! One cooperative loop processes input, applies `update`, executes the
//! returned effects, and draws. Nothing here blocks on the coordinator:
//! events arrive through a channel drained non-blockingly on every tick.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use az_coord::{CoordinatorHandle, UiMsg};
use crossterm::event::{self, Event};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::debug;

use crate::effect::Effect;
use crate::input::InputRouter;
use crate::model::Model;
use crate::msg::Msg;
use crate::theme::Theme;
use crate::update::update;
use crate::view;

/// Result type for app operations.
pub type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Tick cadence of the render loop.
const TICK: Duration = Duration::from_millis(16);

/// How much of the log tail the logs overlay shows.
const LOG_TAIL_LINES: usize = 200;

/// The running application.
pub struct App {
    model: Model,
    router: InputRouter,
    handle: CoordinatorHandle,
    events: mpsc::UnboundedReceiver<UiMsg>,
    /// Pending toast-expiration timers
    timers: Vec<(Instant, Msg)>,
    log_file: PathBuf,
    should_quit: bool,
}

impl App {
    /// Build the app and open its coordinator subscription.
    pub fn new(handle: CoordinatorHandle, theme: Theme, log_file: PathBuf) -> Self {
        let events = handle.subscribe();
        let mut model = Model::new(chrono::Utc::now());
        model.theme = theme;
        Self {
            model,
            router: InputRouter::new(),
            handle,
            events,
            timers: Vec::new(),
            log_file,
            should_quit: false,
        }
    }

    /// Give the model its dev-server names for the dev server menu.
    pub fn with_dev_servers(mut self, names: Vec<String>) -> Self {
        self.model.dev_server_names = names;
        self
    }

    /// Effective configuration rows for the settings overlay.
    pub fn with_settings(mut self, rows: Vec<(String, String)>) -> Self {
        self.model.settings_rows = rows;
        self
    }

    /// Run the TUI until quit. Sets up and restores the terminal.
    pub fn run(&mut self) -> AppResult<()> {
        crossterm::terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_loop(&mut terminal);

        crossterm::terminal::disable_raw_mode()?;
        crossterm::execute!(
            terminal.backend_mut(),
            crossterm::terminal::LeaveAlternateScreen
        )?;
        terminal.show_cursor()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> AppResult<()> {
        while !self.should_quit {
            self.model.now = chrono::Utc::now();
            self.fire_due_timers();
            self.dispatch(Msg::Tick);

            terminal.draw(|frame| view::draw(frame, &self.model))?;

            if event::poll(TICK)? {
                match event::read()? {
                    Event::Key(key) if key.kind != event::KeyEventKind::Release => {
                        if let Some(msg) = self.router.route(key, &self.model) {
                            let msg = self.enrich(msg);
                            self.dispatch(msg);
                        }
                    }
                    Event::Resize(w, h) => self.dispatch(Msg::Resize(w, h)),
                    _ => {}
                }
            }
        }
        debug!("run loop exited");
        Ok(())
    }

    /// Fill in payloads the router cannot know (filesystem reads).
    fn enrich(&self, msg: Msg) -> Msg {
        match msg {
            Msg::OpenLogs { .. } => Msg::OpenLogs {
                lines: tail_lines(&self.log_file, LOG_TAIL_LINES),
            },
            other => other,
        }
    }

    /// Apply a message and execute the resulting effects.
    fn dispatch(&mut self, msg: Msg) {
        let effect = update(&mut self.model, msg);
        self.execute(effect);
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Batch(effects) => {
                for effect in effects {
                    self.execute(effect);
                }
            }
            Effect::Send(request) => self.handle.send(request),
            Effect::PollEvents => {
                // Drain without blocking; each event feeds back into update
                while let Ok(event) = self.events.try_recv() {
                    self.dispatch(Msg::Coord(event));
                }
            }
            Effect::ToastTimer { id, after } => {
                self.timers.push((Instant::now() + after, Msg::ToastExpired(id)));
            }
            Effect::Emit(msg) => self.dispatch(*msg),
            Effect::Quit => self.should_quit = true,
        }
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let mut due = Vec::new();
        self.timers.retain(|(deadline, msg)| {
            if *deadline <= now {
                due.push(msg.clone());
                false
            } else {
                true
            }
        });
        for msg in due {
            self.dispatch(msg);
        }
    }
}

/// Last `n` lines of a file; empty when the file is unreadable.
fn tail_lines(path: &std::path::Path, n: usize) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(n);
            lines[start..].iter().map(|s| s.to_string()).collect()
        }
        Err(_) => Vec::new(),
    }
}
