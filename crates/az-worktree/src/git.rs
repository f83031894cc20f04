//! Git operations for worktree lifecycles.
//!
//! Everything shells out to the `git` binary; there is no libgit2 here. The
//! conflict probe uses `git merge-tree --write-tree`, which creates objects
//! but never touches any working tree, so probing is safe on a live
//! checkout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use az_core::error::{AzError, Result};
use az_core::types::BeadId;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::naming::WorktreeNaming;

/// Dirtiness report for a worktree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyState {
    pub dirty: bool,
    pub changed_files: Vec<String>,
}

/// Conflict probe result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeProbe {
    /// True iff the probe reported at least one conflict hunk
    pub has_risk: bool,
    pub conflicting_files: Vec<String>,
}

/// Diff stats of a branch against the merge base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub additions: u64,
    pub deletions: u64,
    pub files: Vec<String>,
}

/// Capability trait over git worktree operations.
#[async_trait]
pub trait Worktrees: Send + Sync {
    /// Create the bead's branch from `base` and add the worktree. Fails if
    /// either already exists.
    async fn create(
        &self,
        project: &Path,
        bead: &BeadId,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;

    /// Whether the bead's worktree directory exists.
    async fn exists(&self, project: &Path, bead: &BeadId) -> bool;

    /// The deterministic worktree path for a bead, whether or not it exists.
    fn path_of(&self, project: &Path, bead: &BeadId) -> PathBuf;

    /// Force-remove the worktree and delete the branch. Idempotent.
    async fn remove(&self, project: &Path, bead: &BeadId, cancel: &CancellationToken)
    -> Result<()>;

    /// Uncommitted changes in the worktree.
    async fn is_dirty(&self, worktree: &Path, cancel: &CancellationToken) -> Result<DirtyState>;

    /// Read-only three-way merge probe of the worktree branch against `base`.
    async fn check_merge_conflicts(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<MergeProbe>;

    /// Commit counts `(behind, ahead)` of the worktree branch relative to
    /// the merge-base with `base`.
    async fn behind_count(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)>;

    /// Abort an in-progress merge in the worktree.
    async fn abort_merge(&self, worktree: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Merge `base` into the worktree branch (update-from-main).
    async fn merge_from_base(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Merge the bead branch into `base` inside the main checkout.
    async fn merge_into_base(
        &self,
        project: &Path,
        branch: &str,
        base: &str,
        squash: bool,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Line-change stats of the worktree branch against `base`.
    async fn diff_stats(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<DiffStats>;
}

/// Production implementation over the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    naming: WorktreeNaming,
    timeout: Duration,
}

impl GitCli {
    pub fn new(naming: WorktreeNaming, timeout: Duration) -> Self {
        Self { naming, timeout }
    }

    /// The naming scheme in use.
    pub fn naming(&self) -> &WorktreeNaming {
        &self.naming
    }

    /// Run git with args in `cwd`, returning stdout.
    #[instrument(level = "debug", skip_all, fields(args = ?args, cwd = %cwd.display()))]
    async fn run(&self, cwd: &Path, args: &[&str], cancel: &CancellationToken) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd).kill_on_drop(true);

        let output = tokio::select! {
            out = tokio::time::timeout(self.timeout, cmd.output()) => match out {
                Ok(result) => result.map_err(|e| AzError::unavailable("git", &e))?,
                Err(_) => {
                    return Err(AzError::Timeout {
                        program: "git".into(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                return Err(AzError::Cancelled {
                    operation: format!("git {}", args.first().copied().unwrap_or("")),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzError::command("git", stderr.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Resolve a revision to an object id, or None if it does not exist.
    async fn rev_parse(&self, cwd: &Path, rev: &str, cancel: &CancellationToken) -> Option<String> {
        self.run(cwd, &["rev-parse", "--verify", "--quiet", rev], cancel)
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl Worktrees for GitCli {
    async fn create(
        &self,
        project: &Path,
        bead: &BeadId,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let path = self.naming.worktree_path(project, bead);
        let branch = self.naming.branch_name(bead);

        if path.exists() {
            return Err(AzError::validation(format!(
                "worktree already exists: {}",
                path.display()
            )));
        }
        if self.rev_parse(project, &branch, cancel).await.is_some() {
            return Err(AzError::validation(format!(
                "branch already exists: {branch}"
            )));
        }

        let path_str = path.to_string_lossy().into_owned();
        self.run(
            project,
            &["worktree", "add", "-b", &branch, &path_str, base],
            cancel,
        )
        .await?;

        debug!(bead, path = %path.display(), branch, "created worktree");
        Ok(path)
    }

    async fn exists(&self, project: &Path, bead: &BeadId) -> bool {
        self.naming.worktree_path(project, bead).exists()
    }

    fn path_of(&self, project: &Path, bead: &BeadId) -> PathBuf {
        self.naming.worktree_path(project, bead)
    }

    async fn remove(
        &self,
        project: &Path,
        bead: &BeadId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = self.naming.worktree_path(project, bead);
        let branch = self.naming.branch_name(bead);

        if path.exists() {
            let path_str = path.to_string_lossy().into_owned();
            self.run(project, &["worktree", "remove", "--force", &path_str], cancel)
                .await?;
        }
        // Prune bookkeeping left by externally deleted directories
        let _ = self.run(project, &["worktree", "prune"], cancel).await;

        if self.rev_parse(project, &branch, cancel).await.is_some() {
            if let Err(e) = self.run(project, &["branch", "-D", &branch], cancel).await {
                warn!(branch, error = %e, "failed to delete branch");
            }
        }
        debug!(bead, "removed worktree");
        Ok(())
    }

    async fn is_dirty(&self, worktree: &Path, cancel: &CancellationToken) -> Result<DirtyState> {
        let out = self
            .run(worktree, &["status", "--porcelain"], cancel)
            .await?;
        let changed_files: Vec<String> = out
            .lines()
            .filter(|l| l.len() > 3)
            .map(|l| l[3..].to_string())
            .collect();
        Ok(DirtyState {
            dirty: !changed_files.is_empty(),
            changed_files,
        })
    }

    async fn check_merge_conflicts(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<MergeProbe> {
        // merge-tree exits 1 on conflicts, so inspect stdout on failure too
        let mut cmd = Command::new("git");
        cmd.args(["merge-tree", "--write-tree", "--name-only", base, "HEAD"])
            .current_dir(worktree)
            .kill_on_drop(true);

        let output = tokio::select! {
            out = tokio::time::timeout(self.timeout, cmd.output()) => match out {
                Ok(result) => result.map_err(|e| AzError::unavailable("git", &e))?,
                Err(_) => {
                    return Err(AzError::Timeout {
                        program: "git".into(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                return Err(AzError::Cancelled { operation: "git merge-tree".into() });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.status.code() {
            Some(0) => Ok(MergeProbe::default()),
            Some(1) => Ok(parse_merge_tree_conflicts(&stdout)),
            _ => Err(AzError::command(
                "git",
                String::from_utf8_lossy(&output.stderr).to_string(),
            )),
        }
    }

    async fn behind_count(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        let range = format!("{base}...HEAD");
        let out = self
            .run(worktree, &["rev-list", "--left-right", "--count", &range], cancel)
            .await?;
        let mut parts = out.split_whitespace();
        let behind = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AzError::command("git", format!("unparseable rev-list output: {out}")))?;
        let ahead = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| AzError::command("git", format!("unparseable rev-list output: {out}")))?;
        Ok((behind, ahead))
    }

    async fn abort_merge(&self, worktree: &Path, cancel: &CancellationToken) -> Result<()> {
        self.run(worktree, &["merge", "--abort"], cancel)
            .await
            .map(|_| ())
    }

    async fn merge_from_base(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.run(worktree, &["merge", "--no-edit", base], cancel).await {
            Ok(_) => Ok(()),
            Err(AzError::CommandFailed { message, .. })
                if message.to_lowercase().contains("conflict") =>
            {
                let state = self.is_dirty(worktree, cancel).await.unwrap_or_default();
                Err(AzError::MergeConflict {
                    files: state.changed_files,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn merge_into_base(
        &self,
        project: &Path,
        branch: &str,
        base: &str,
        squash: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(project, &["checkout", base], cancel).await?;
        let result = if squash {
            match self.run(project, &["merge", "--squash", branch], cancel).await {
                Ok(_) => {
                    let msg = format!("{branch}: squash merge");
                    self.run(project, &["commit", "-m", &msg], cancel).await.map(|_| ())
                }
                Err(e) => Err(e),
            }
        } else {
            self.run(project, &["merge", "--no-ff", "--no-edit", branch], cancel)
                .await
                .map(|_| ())
        };
        match result {
            Ok(()) => Ok(()),
            Err(AzError::CommandFailed { message, .. })
                if message.to_lowercase().contains("conflict") =>
            {
                let state = self.is_dirty(project, cancel).await.unwrap_or_default();
                Err(AzError::MergeConflict {
                    files: state.changed_files,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn diff_stats(
        &self,
        worktree: &Path,
        base: &str,
        cancel: &CancellationToken,
    ) -> Result<DiffStats> {
        let range = format!("{base}...HEAD");
        let out = self
            .run(worktree, &["diff", "--numstat", &range], cancel)
            .await?;
        let mut stats = DiffStats::default();
        for line in out.lines() {
            let mut parts = line.split_whitespace();
            // Binary files report "-" in both columns
            if let (Some(a), Some(d)) = (parts.next(), parts.next()) {
                stats.additions += a.parse::<u64>().unwrap_or(0);
                stats.deletions += d.parse::<u64>().unwrap_or(0);
                if let Some(file) = parts.next() {
                    stats.files.push(file.to_string());
                }
            }
        }
        Ok(stats)
    }
}

/// Parse `git merge-tree --write-tree --name-only` conflict output.
///
/// On conflict the first line is the written tree oid, followed by the
/// conflicted file names, then informational messages separated by a blank
/// line.
fn parse_merge_tree_conflicts(stdout: &str) -> MergeProbe {
    let mut files = Vec::new();
    for line in stdout.lines().skip(1) {
        if line.trim().is_empty() {
            break;
        }
        files.push(line.trim().to_string());
    }
    MergeProbe {
        has_risk: true,
        conflicting_files: files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> GitCli {
        GitCli::new(WorktreeNaming::default(), Duration::from_secs(30))
    }

    #[test]
    fn test_parse_merge_tree_conflicts() {
        let out = "3fa9c1d2\nsrc/a.txt\nsrc/b.txt\n\nAuto-merging src/a.txt\nCONFLICT (content)\n";
        let probe = parse_merge_tree_conflicts(out);
        assert!(probe.has_risk);
        assert_eq!(probe.conflicting_files, ["src/a.txt", "src/b.txt"]);
    }

    #[test]
    fn test_parse_merge_tree_no_file_section() {
        let probe = parse_merge_tree_conflicts("deadbeef\n");
        assert!(probe.has_risk);
        assert!(probe.conflicting_files.is_empty());
    }

    // Live tests require a git installation; they build a scratch repository
    // with an initial commit and exercise the full worktree cycle.

    async fn init_repo() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = tmp.path().join("proj");
        std::fs::create_dir_all(&repo).unwrap();
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "t@t"],
            vec!["config", "user.name", "t"],
        ] {
            let st = Command::new("git")
                .args(&args)
                .current_dir(&repo)
                .output()
                .await
                .unwrap();
            assert!(st.status.success());
        }
        std::fs::write(repo.join("a.txt"), "one\n").unwrap();
        for args in [vec!["add", "."], vec!["commit", "-m", "init"]] {
            let st = Command::new("git")
                .args(&args)
                .current_dir(&repo)
                .output()
                .await
                .unwrap();
            assert!(st.status.success());
        }
        (tmp, repo)
    }

    #[tokio::test]
    #[ignore = "requires git installation"]
    async fn test_worktree_lifecycle() {
        let (_tmp, repo) = init_repo().await;
        let git = cli();
        let cancel = CancellationToken::new();
        let bead = "az-1".to_string();

        let path = git.create(&repo, &bead, "main", &cancel).await.unwrap();
        assert!(path.exists());
        assert!(git.exists(&repo, &bead).await);

        // Second create fails
        assert!(git.create(&repo, &bead, "main", &cancel).await.is_err());

        let state = git.is_dirty(&path, &cancel).await.unwrap();
        assert!(!state.dirty);

        std::fs::write(path.join("b.txt"), "x\n").unwrap();
        let state = git.is_dirty(&path, &cancel).await.unwrap();
        assert!(state.dirty);
        assert_eq!(state.changed_files, ["b.txt"]);

        git.remove(&repo, &bead, &cancel).await.unwrap();
        assert!(!git.exists(&repo, &bead).await);
        // Idempotent
        git.remove(&repo, &bead, &cancel).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires git installation"]
    async fn test_conflict_probe_is_read_only() {
        let (_tmp, repo) = init_repo().await;
        let git = cli();
        let cancel = CancellationToken::new();
        let bead = "az-2".to_string();

        let wt = git.create(&repo, &bead, "main", &cancel).await.unwrap();

        // Diverge: same line changed on both sides
        std::fs::write(wt.join("a.txt"), "worktree\n").unwrap();
        for args in [vec!["add", "."], vec!["commit", "-m", "wt"]] {
            Command::new("git").args(&args).current_dir(&wt).output().await.unwrap();
        }
        std::fs::write(repo.join("a.txt"), "mainline\n").unwrap();
        for args in [vec!["add", "."], vec!["commit", "-m", "main"]] {
            Command::new("git").args(&args).current_dir(&repo).output().await.unwrap();
        }

        let probe = git.check_merge_conflicts(&wt, "main", &cancel).await.unwrap();
        assert!(probe.has_risk);
        assert_eq!(probe.conflicting_files, ["a.txt"]);

        // The probe must not have dirtied the working tree
        let state = git.is_dirty(&wt, &cancel).await.unwrap();
        assert!(!state.dirty);

        let (behind, ahead) = git.behind_count(&wt, "main", &cancel).await.unwrap();
        assert_eq!((behind, ahead), (1, 1));
    }
}
