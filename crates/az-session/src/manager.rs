//! Per-bead assistant session lifecycle.
//!
//! State machine per bead: Idle → Busy on start; Busy ⇄ Waiting/Paused as
//! activity and user actions dictate; Done/Error reported by the monitor;
//! stop from any non-Idle state returns to Idle. Start is transactional:
//! a half-created worktree is rolled back when the multiplexer refuses the
//! session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use az_core::error::{AzError, Result};
use az_core::types::{BeadId, SessionState, Timestamp, now};
use az_mux::{Multiplexer, SessionOptions};
use az_worktree::Worktrees;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::activity::{ActivityClassifier, ActivityMonitor, DEFAULT_SAMPLE_INTERVAL};
use crate::names::{SessionNames, shell_quote};

/// Options for starting an assistant session.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub project_path: PathBuf,
    /// Prompt handed to the assistant as its first instruction
    pub initial_prompt: Option<String>,
    /// Pass the assistant's permission-bypass flag
    pub skip_permissions: bool,
    /// Model override forwarded via `--model`
    pub model: Option<String>,
}

/// Public view of one session table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_name: Option<String>,
    pub last_activity: Timestamp,
}

struct Entry {
    state: SessionState,
    session_name: String,
    last_activity: Timestamp,
    monitor: Option<ActivityMonitor>,
}

/// Launch parameters shared by all sessions.
#[derive(Debug, Clone)]
pub struct AssistantCommand {
    /// Base command, e.g. `claude`
    pub program: String,
    /// Commands run in the session before the assistant starts
    pub init_commands: Vec<String>,
}

/// Owns the per-bead session table and drives lifecycles.
pub struct SessionManager {
    mux: Arc<dyn Multiplexer>,
    worktrees: Arc<dyn Worktrees>,
    names: SessionNames,
    assistant: AssistantCommand,
    base_branch: String,
    /// Where final transcripts land on stop
    session_log_dir: PathBuf,
    sample_interval: Duration,
    table: HashMap<BeadId, Entry>,
}

impl SessionManager {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        worktrees: Arc<dyn Worktrees>,
        names: SessionNames,
        assistant: AssistantCommand,
        base_branch: String,
        session_log_dir: PathBuf,
    ) -> Self {
        Self {
            mux,
            worktrees,
            names,
            assistant,
            base_branch,
            session_log_dir,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            table: HashMap::new(),
        }
    }

    /// Override the activity sampling interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Current state for a bead; a missing entry is Idle.
    pub fn state(&self, bead: &BeadId) -> SessionState {
        self.table.get(bead).map(|e| e.state).unwrap_or_default()
    }

    /// The session name for a bead, when one is running.
    pub fn session_name(&self, bead: &BeadId) -> Option<&str> {
        self.table.get(bead).map(|e| e.session_name.as_str())
    }

    /// Snapshot of all known session states.
    pub fn states(&self) -> HashMap<BeadId, SessionState> {
        self.table
            .iter()
            .map(|(id, e)| (id.clone(), e.state))
            .collect()
    }

    /// Full snapshot of one entry.
    pub fn snapshot(&self, bead: &BeadId) -> SessionSnapshot {
        match self.table.get(bead) {
            Some(e) => SessionSnapshot {
                state: e.state,
                session_name: Some(e.session_name.clone()),
                last_activity: e.last_activity,
            },
            None => SessionSnapshot {
                state: SessionState::Idle,
                session_name: None,
                last_activity: now(),
            },
        }
    }

    /// Record a state observed by the activity monitor.
    pub fn observe(&mut self, bead: &BeadId, state: SessionState) {
        if let Some(entry) = self.table.get_mut(bead) {
            // A paused session reports nothing; ignore stale samples
            if entry.state == SessionState::Paused {
                return;
            }
            entry.state = state;
            entry.last_activity = now();
        }
    }

    /// Start an assistant session for a bead.
    ///
    /// Steps: ensure the worktree exists (created from the base branch when
    /// missing), create the multiplexer session running the assistant, then
    /// mark the bead Busy and begin monitoring. Failure of a later step
    /// rolls back what the earlier ones created.
    #[instrument(level = "info", skip_all, fields(bead = %bead))]
    pub async fn start(
        &mut self,
        bead: &BeadId,
        opts: &StartOptions,
        events: mpsc::UnboundedSender<(BeadId, SessionState)>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let current = self.state(bead);
        if current != SessionState::Idle {
            return Err(AzError::validation(format!(
                "session for {bead} is already {current}"
            )));
        }

        let session_name = self.names.assistant(bead);
        if self.mux.has_session(&session_name).await? {
            return Err(AzError::SessionExists { name: session_name });
        }

        // Step 1: worktree (no-op if it already exists)
        let created_worktree = if self.worktrees.exists(&opts.project_path, bead).await {
            false
        } else {
            self.worktrees
                .create(&opts.project_path, bead, &self.base_branch, cancel)
                .await?;
            true
        };
        let worktree = self
            .worktrees
            .path_of(&opts.project_path, bead);

        // Step 2: multiplexer session running the assistant
        let command = self.launch_command(opts);
        let result = self
            .mux
            .new_session(
                &session_name,
                &SessionOptions {
                    cwd: Some(worktree),
                    command: Some(command),
                    env: Vec::new(),
                },
            )
            .await;

        if let Err(e) = result {
            if created_worktree {
                if let Err(cleanup) = self
                    .worktrees
                    .remove(&opts.project_path, bead, cancel)
                    .await
                {
                    warn!(error = %cleanup, "rollback of half-created worktree failed");
                }
            }
            return Err(e);
        }

        // Step 3: table entry + monitor
        let monitor = ActivityMonitor::spawn(
            Arc::clone(&self.mux),
            bead.clone(),
            session_name.clone(),
            ActivityClassifier::default(),
            self.sample_interval,
            events,
        );
        self.table.insert(
            bead.clone(),
            Entry {
                state: SessionState::Busy,
                session_name,
                last_activity: now(),
                monitor: Some(monitor),
            },
        );
        info!("session started");
        Ok(())
    }

    /// Suspend a Busy session with SIGSTOP.
    pub async fn pause(&mut self, bead: &BeadId) -> Result<()> {
        let entry = self
            .table
            .get_mut(bead)
            .ok_or_else(|| AzError::not_found("session", bead))?;
        if entry.state != SessionState::Busy {
            return Err(AzError::validation(format!(
                "can only pause a busy session ({bead} is {})",
                entry.state
            )));
        }
        let pid = self
            .mux
            .session_pid(&entry.session_name)
            .await?
            .ok_or_else(|| AzError::not_found("session pid", bead))?;
        signal_group(pid, "-STOP").await?;
        entry.state = SessionState::Paused;
        entry.last_activity = now();
        debug!(bead, "session paused");
        Ok(())
    }

    /// Resume a Paused session with SIGCONT.
    pub async fn resume(&mut self, bead: &BeadId) -> Result<()> {
        let entry = self
            .table
            .get_mut(bead)
            .ok_or_else(|| AzError::not_found("session", bead))?;
        if entry.state != SessionState::Paused {
            return Err(AzError::validation(format!(
                "can only resume a paused session ({bead} is {})",
                entry.state
            )));
        }
        let pid = self
            .mux
            .session_pid(&entry.session_name)
            .await?
            .ok_or_else(|| AzError::not_found("session pid", bead))?;
        signal_group(pid, "-CONT").await?;
        entry.state = SessionState::Busy;
        entry.last_activity = now();
        debug!(bead, "session resumed");
        Ok(())
    }

    /// Tear down a session: write the final transcript, kill the
    /// multiplexer session, drop the monitor, return to Idle.
    #[instrument(level = "info", skip_all, fields(bead = %bead))]
    pub async fn stop(&mut self, bead: &BeadId) -> Result<()> {
        let entry = self
            .table
            .remove(bead)
            .ok_or_else(|| AzError::not_found("session", bead))?;

        if let Some(monitor) = &entry.monitor {
            monitor.stop();
        }

        // Best-effort transcript before the pane disappears
        if let Ok(capture) = self.mux.capture_pane(&entry.session_name).await {
            let _ = self.write_transcript(bead, &capture);
        }

        self.mux.kill_session(&entry.session_name).await?;
        info!("session stopped");
        Ok(())
    }

    /// Whether any bead has a non-Idle session.
    pub fn any_active(&self) -> bool {
        self.table.values().any(|e| e.state.is_active())
    }

    fn write_transcript(&self, bead: &BeadId, capture: &str) -> Result<()> {
        std::fs::create_dir_all(&self.session_log_dir)
            .map_err(|e| AzError::io("creating session log dir", &self.session_log_dir, e))?;
        let path = self.session_log_dir.join(format!("{bead}.log"));
        std::fs::write(&path, capture).map_err(|e| AzError::io("writing transcript", &path, e))
    }

    /// Assemble the shell command the session runs.
    fn launch_command(&self, opts: &StartOptions) -> String {
        let mut parts: Vec<String> = self.assistant.init_commands.clone();
        let mut assistant = self.assistant.program.clone();
        if let Some(model) = &opts.model {
            assistant.push_str(" --model ");
            assistant.push_str(&shell_quote(model));
        }
        if opts.skip_permissions {
            assistant.push_str(" --dangerously-skip-permissions");
        }
        if let Some(prompt) = &opts.initial_prompt {
            assistant.push(' ');
            assistant.push_str(&shell_quote(prompt));
        }
        parts.push(assistant);
        parts.join(" && ")
    }
}

/// Signal a session's whole process group through its pane pid.
async fn signal_group(pid: u32, sig: &str) -> Result<()> {
    let output = Command::new("kill")
        .args([sig, &format!("-{pid}")])
        .output()
        .await
        .map_err(|e| AzError::unavailable("kill", &e))?;
    if !output.status.success() {
        return Err(AzError::command(
            "kill",
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(())
}
