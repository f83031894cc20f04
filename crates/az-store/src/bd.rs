//! Adapter over the `bd` beads CLI.
//!
//! Thin and cache-free: every call shells out to `bd` with the working
//! directory set to the project path and parses its `--json` output. Errors
//! are classified into the shared taxonomy (NotFound / Validation /
//! BackendUnavailable / CommandFailed) from `bd`'s exit status and stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use az_core::error::{AzError, Result};
use az_core::types::BeadId;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::bead::{Bead, BeadDraft, BeadPatch};

/// Dependency edge kinds understood by `bd dep add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Epic membership
    ParentChild,
    /// Ordinary blocking dependency
    Blocks,
}

impl DependencyKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ParentChild => "parent-child",
            Self::Blocks => "blocks",
        }
    }
}

/// Capability trait over the beads tracker.
///
/// One production implementation ([`BdCli`]) plus test doubles. Every call is
/// cancellable through the provided token.
#[async_trait]
pub trait BeadStore: Send + Sync {
    /// Full snapshot of the project's beads. No ordering guarantees.
    async fn list(&self, project: &Path, cancel: &CancellationToken) -> Result<Vec<Bead>>;

    /// A single bead including description and design notes.
    async fn show(&self, project: &Path, id: &BeadId, cancel: &CancellationToken) -> Result<Bead>;

    /// Create a bead; the store assigns and returns the id.
    async fn create(
        &self,
        project: &Path,
        draft: &BeadDraft,
        cancel: &CancellationToken,
    ) -> Result<Bead>;

    /// Apply a partial update.
    async fn update(
        &self,
        project: &Path,
        id: &BeadId,
        patch: &BeadPatch,
        cancel: &CancellationToken,
    ) -> Result<Bead>;

    /// Delete a bead. Idempotent on NotFound.
    async fn delete(&self, project: &Path, id: &BeadId, cancel: &CancellationToken) -> Result<()>;

    /// Add a dependency edge between two beads.
    async fn add_dependency(
        &self,
        project: &Path,
        child: &BeadId,
        parent: &BeadId,
        kind: DependencyKind,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Immediate children of an epic (ids only).
    async fn epic_children(
        &self,
        project: &Path,
        epic: &BeadId,
        cancel: &CancellationToken,
    ) -> Result<Vec<BeadId>>;
}

/// Production adapter invoking the `bd` binary.
#[derive(Debug, Clone)]
pub struct BdCli {
    program: PathBuf,
    timeout: Duration,
}

impl BdCli {
    /// Create an adapter for the `bd` on PATH with the given command timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("bd"),
            timeout,
        }
    }

    /// Override the binary path (tests, unusual installs).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `bd` with the given args in `project`, returning stdout.
    #[instrument(level = "debug", skip_all, fields(args = ?args))]
    async fn run(
        &self,
        project: &Path,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).current_dir(project).kill_on_drop(true);

        let fut = cmd.output();
        let output = tokio::select! {
            out = tokio::time::timeout(self.timeout, fut) => match out {
                Ok(result) => result.map_err(|e| AzError::unavailable("bd", &e))?,
                Err(_) => {
                    return Err(AzError::Timeout {
                        program: "bd".into(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                return Err(AzError::Cancelled {
                    operation: format!("bd {}", args.first().copied().unwrap_or("")),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(args, &stderr));
        }

        debug!("bd completed");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Classify a non-zero `bd` exit from its stderr.
fn classify(args: &[&str], stderr: &str) -> AzError {
    let lower = stderr.to_lowercase();
    if lower.contains("not found") || lower.contains("no such issue") {
        let id = args.get(1).copied().unwrap_or("?");
        AzError::not_found("bead", id)
    } else if lower.contains("invalid") || lower.contains("required") {
        AzError::validation(stderr.lines().next().unwrap_or("invalid input").to_string())
    } else {
        AzError::command("bd", stderr.to_string())
    }
}

#[async_trait]
impl BeadStore for BdCli {
    async fn list(&self, project: &Path, cancel: &CancellationToken) -> Result<Vec<Bead>> {
        let out = self
            .run(project, &["list", "--all", "--json"], cancel)
            .await?;
        parse_beads(&out)
    }

    async fn show(&self, project: &Path, id: &BeadId, cancel: &CancellationToken) -> Result<Bead> {
        let out = self.run(project, &["show", id, "--json"], cancel).await?;
        parse_bead(&out)
    }

    async fn create(
        &self,
        project: &Path,
        draft: &BeadDraft,
        cancel: &CancellationToken,
    ) -> Result<Bead> {
        if draft.title.trim().is_empty() {
            return Err(AzError::validation("bead title is required"));
        }
        let priority = draft.priority.value().to_string();
        let mut args = vec![
            "create",
            draft.title.as_str(),
            "--type",
            draft.issue_type.as_str(),
            "--priority",
            priority.as_str(),
            "--json",
        ];
        if let Some(desc) = &draft.description {
            args.extend_from_slice(&["--description", desc]);
        }
        if let Some(parent) = &draft.parent {
            args.extend_from_slice(&["--parent", parent]);
        }
        let out = self.run(project, &args, cancel).await?;
        parse_bead(&out)
    }

    async fn update(
        &self,
        project: &Path,
        id: &BeadId,
        patch: &BeadPatch,
        cancel: &CancellationToken,
    ) -> Result<Bead> {
        if patch.is_empty() {
            return Err(AzError::validation("nothing to update"));
        }
        let mut args: Vec<String> = vec!["update".into(), id.clone(), "--json".into()];
        if let Some(title) = &patch.title {
            args.push("--title".into());
            args.push(title.clone());
        }
        if let Some(desc) = &patch.description {
            args.push("--description".into());
            args.push(desc.clone());
        }
        if let Some(design) = &patch.design {
            args.push("--design".into());
            args.push(design.clone());
        }
        if let Some(status) = &patch.status {
            args.push("--status".into());
            args.push(status.as_str().into());
        }
        if let Some(priority) = &patch.priority {
            args.push("--priority".into());
            args.push(priority.value().to_string());
        }
        if let Some(kind) = &patch.issue_type {
            args.push("--type".into());
            args.push(kind.as_str().into());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run(project, &arg_refs, cancel).await?;
        parse_bead(&out)
    }

    async fn delete(&self, project: &Path, id: &BeadId, cancel: &CancellationToken) -> Result<()> {
        match self.run(project, &["delete", id, "--force"], cancel).await {
            Ok(_) => Ok(()),
            // Deleting an absent bead is a success
            Err(AzError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn add_dependency(
        &self,
        project: &Path,
        child: &BeadId,
        parent: &BeadId,
        kind: DependencyKind,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            project,
            &["dep", "add", child, parent, "--type", kind.as_str()],
            cancel,
        )
        .await
        .map(|_| ())
    }

    async fn epic_children(
        &self,
        project: &Path,
        epic: &BeadId,
        cancel: &CancellationToken,
    ) -> Result<Vec<BeadId>> {
        let out = self
            .run(project, &["dep", "children", epic, "--json"], cancel)
            .await?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(out.trim()).map_err(|e| parse_error("epic children", &e))?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.get("id").and_then(|id| id.as_str()).map(String::from))
            .collect())
    }
}

fn parse_beads(raw: &str) -> Result<Vec<Bead>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| parse_error("bead list", &e))
}

fn parse_bead(raw: &str) -> Result<Bead> {
    serde_json::from_str(raw.trim()).map_err(|e| parse_error("bead", &e))
}

fn parse_error(context: &str, e: &serde_json::Error) -> AzError {
    AzError::command("bd", format!("unparseable {context} output: {e}"))
}
