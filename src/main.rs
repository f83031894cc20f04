//! azedarach - a terminal kanban coordinator for bead-driven AI sessions.
//!
//! ## Usage
//!
//! ```bash
//! # Launch against the project the current directory resolves to
//! az
//!
//! # Launch against a specific registered project
//! az --project /path/to/repo
//!
//! # With verbose logging
//! az -v
//! ```

use std::io::Write;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use az_core::{AzConfig, ProjectRegistry, init_logging};
use az_coord::Coordinator;
use az_tui::App;
use az_tui::theme::Theme;
use clap::Parser;
use tracing::{error, info};

/// Azedarach board
///
/// A terminal interface for driving per-bead AI assistant sessions in git
/// worktrees, against a `bd` issue database.
#[derive(Parser, Debug)]
#[command(name = "az")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Registered project to open (defaults to the current directory's
    /// project, then the registry default)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.azedarach/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => {
            info!("azedarach exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal: {e}");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Resolve the project before logging so a bad registry prints cleanly
    let registry = ProjectRegistry::load(ProjectRegistry::default_path())?;
    let cwd = std::env::current_dir()?;
    let project = match &cli.project {
        Some(path) => registry
            .by_path(path)
            .or_else(|| registry.resolve(path))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("not a registered project: {}", path.display()))?,
        None => registry
            .resolve(&cwd)
            .or_else(|| registry.default_project())
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no project registered; add one to {}",
                    ProjectRegistry::default_path().display()
                )
            })?,
    };

    let config = AzConfig::load(&project.path)?;
    let _guard = init_logging(
        cli.log_dir.clone().or_else(|| {
            if config.session.log_dir.is_empty() {
                None
            } else {
                Some(config.log_dir())
            }
        }),
        cli.verbose > 0,
    )?;
    install_panic_hook();
    info!(project = %project.name, "starting azedarach");

    // The UI loop owns the main thread; coordinator tasks run on the
    // runtime's workers.
    let runtime = tokio::runtime::Runtime::new()?;
    let _enter = runtime.enter();

    let naming = az_worktree::WorktreeNaming::new(
        &config.worktree.name_format,
        &config.worktree.base_path,
    );
    let theme = Theme::from_config(&config.theme);
    let log_file = config.log_dir().join("az.log");
    let dev_servers: Vec<String> = config
        .dev_server
        .servers
        .iter()
        .map(|s| s.name.clone())
        .collect();

    let handle = Coordinator::spawn(
        config.clone(),
        registry,
        project,
        Arc::new(az_store::BdCli::new(config.command_timeout())),
        Arc::new(az_worktree::GitCli::new(naming, config.command_timeout())),
        Arc::new(az_mux::TmuxCli::new()),
    );

    let settings_rows = vec![
        ("config".to_string(), config.source.label().to_string()),
        ("cliTool".to_string(), config.cli_tool.clone()),
        ("git.baseBranch".to_string(), config.git.base_branch.clone()),
        (
            "merge.strategy".to_string(),
            format!("{:?}", config.merge.strategy).to_lowercase(),
        ),
        (
            "worktree.nameFormat".to_string(),
            config.worktree.name_format.clone(),
        ),
        (
            "session.tmuxPrefix".to_string(),
            config.session.tmux_prefix.clone(),
        ),
        (
            "beads.syncInterval".to_string(),
            format!("{}s", config.beads.sync_interval),
        ),
    ];

    let mut app = App::new(handle, theme, log_file)
        .with_dev_servers(dev_servers)
        .with_settings(settings_rows);
    let ui_result = app.run().map_err(|e| anyhow::anyhow!("{e}"));

    drop(_enter);
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    ui_result
}

/// Restore the terminal before printing a panic so the message is readable.
fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

fn restore_terminal() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    let _ = crossterm::terminal::disable_raw_mode();
    crossterm::execute!(stdout, crossterm::terminal::LeaveAlternateScreen)?;
    crossterm::execute!(stdout, crossterm::cursor::Show)?;
    stdout.flush()?;
    Ok(())
}
