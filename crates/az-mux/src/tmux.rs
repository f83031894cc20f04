//! Tmux session management.
//!
//! This module wraps the handful of tmux verbs azedarach needs: session
//! create/has/kill, client switching, modal popups, and pane capture for
//! activity detection.

use std::path::PathBuf;

use async_trait::async_trait;
use az_core::error::{AzError, Result};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Options for creating a new detached session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Working directory for the session
    pub cwd: Option<PathBuf>,
    /// Command to run; None leaves a shell
    pub command: Option<String>,
    /// Extra environment variables set for the session
    pub env: Vec<(String, String)>,
}

/// Options for a modal popup that blocks until dismissed.
#[derive(Debug, Clone, Default)]
pub struct PopupOptions {
    pub command: String,
    /// Percent of the client width, e.g. 80
    pub width: Option<u8>,
    pub height: Option<u8>,
    pub title: Option<String>,
    pub cwd: Option<PathBuf>,
}

/// Capability trait over the multiplexer.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Whether a session with this exact name exists.
    async fn has_session(&self, name: &str) -> Result<bool>;

    /// Create a new detached session.
    async fn new_session(&self, name: &str, opts: &SessionOptions) -> Result<()>;

    /// Kill a session. Missing sessions are not an error.
    async fn kill_session(&self, name: &str) -> Result<()>;

    /// Attach the user's client to the named session.
    async fn switch_client(&self, name: &str) -> Result<()>;

    /// Show a modal popup; resolves when the popup is dismissed.
    async fn display_popup(&self, opts: &PopupOptions) -> Result<()>;

    /// Capture the visible pane content of a session.
    async fn capture_pane(&self, name: &str) -> Result<String>;

    /// Send keys (a command line plus Enter) to a session.
    async fn send_keys(&self, name: &str, keys: &str) -> Result<()>;

    /// Pid of the process running in the session's pane, if any.
    async fn session_pid(&self, name: &str) -> Result<Option<u32>>;
}

/// Production adapter over the `tmux` binary.
#[derive(Debug, Clone, Default)]
pub struct TmuxCli;

impl TmuxCli {
    pub fn new() -> Self {
        Self
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| AzError::unavailable("tmux", &e))
    }
}

#[async_trait]
impl Multiplexer for TmuxCli {
    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn has_session(&self, name: &str) -> Result<bool> {
        // Exact match; has-session -t treats the name as a prefix
        let target = format!("={name}");
        let output = self.output(&["has-session", "-t", &target]).await?;
        Ok(output.status.success())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn new_session(&self, name: &str, opts: &SessionOptions) -> Result<()> {
        let mut args: Vec<String> = vec!["new-session".into(), "-d".into(), "-s".into(), name.into()];
        if let Some(cwd) = &opts.cwd {
            args.push("-c".into());
            args.push(cwd.to_string_lossy().into_owned());
        }
        for (key, value) in &opts.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        if let Some(command) = &opts.command {
            args.push(command.clone());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.output(&arg_refs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("duplicate session") {
                return Err(AzError::SessionExists { name: name.into() });
            }
            return Err(AzError::command("tmux", stderr.to_string()));
        }
        debug!("created tmux session");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn kill_session(&self, name: &str) -> Result<()> {
        let target = format!("={name}");
        let output = self.output(&["kill-session", "-t", &target]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // It's okay if the session doesn't exist
            if !stderr.contains("can't find session") {
                warn!(%stderr, "failed to kill session");
                return Err(AzError::command("tmux", stderr.to_string()));
            }
        }
        debug!("killed tmux session");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn switch_client(&self, name: &str) -> Result<()> {
        let target = format!("={name}");
        let output = self.output(&["switch-client", "-t", &target]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find session") {
                return Err(AzError::not_found("session", name));
            }
            return Err(AzError::command("tmux", stderr.to_string()));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn display_popup(&self, opts: &PopupOptions) -> Result<()> {
        let mut args: Vec<String> = vec!["display-popup".into(), "-E".into()];
        if let Some(width) = opts.width {
            args.push("-w".into());
            args.push(format!("{width}%"));
        }
        if let Some(height) = opts.height {
            args.push("-h".into());
            args.push(format!("{height}%"));
        }
        if let Some(title) = &opts.title {
            args.push("-T".into());
            args.push(title.clone());
        }
        if let Some(cwd) = &opts.cwd {
            args.push("-d".into());
            args.push(cwd.to_string_lossy().into_owned());
        }
        args.push(opts.command.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.output(&arg_refs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzError::command("tmux", stderr.to_string()));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn capture_pane(&self, name: &str) -> Result<String> {
        let target = format!("={name}");
        let output = self.output(&["capture-pane", "-t", &target, "-p"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find session") {
                return Err(AzError::not_found("session", name));
            }
            return Err(AzError::command("tmux", stderr.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn send_keys(&self, name: &str, keys: &str) -> Result<()> {
        let target = format!("={name}");
        let output = self
            .output(&["send-keys", "-t", &target, keys, "Enter"])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzError::command("tmux", stderr.to_string()));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(session = %name))]
    async fn session_pid(&self, name: &str) -> Result<Option<u32>> {
        let target = format!("={name}");
        let output = self
            .output(&["display-message", "-t", &target, "-p", "#{pane_pid}"])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                warn!(raw = %stdout.trim(), "invalid pid from tmux");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require tmux and create real sessions; ignored by default.

    #[tokio::test]
    #[ignore = "requires tmux installation"]
    async fn test_session_lifecycle() {
        let tmux = TmuxCli::new();
        let name = "az-test-session";

        let _ = tmux.kill_session(name).await;
        assert!(!tmux.has_session(name).await.unwrap());

        tmux.new_session(
            name,
            &SessionOptions {
                cwd: Some("/tmp".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(tmux.has_session(name).await.unwrap());

        // Duplicate create is classified
        let err = tmux.new_session(name, &SessionOptions::default()).await.unwrap_err();
        assert!(matches!(err, AzError::SessionExists { .. }));

        let content = tmux.capture_pane(name).await.unwrap();
        assert!(!content.is_empty() || content.is_empty()); // capture succeeds

        tmux.kill_session(name).await.unwrap();
        assert!(!tmux.has_session(name).await.unwrap());

        // Killing a dead session is fine
        tmux.kill_session(name).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires tmux installation"]
    async fn test_capture_missing_session_not_found() {
        let tmux = TmuxCli::new();
        let err = tmux.capture_pane("az-no-such-session").await.unwrap_err();
        assert!(matches!(err, AzError::NotFound { .. }));
    }
}
