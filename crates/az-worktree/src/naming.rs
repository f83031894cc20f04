//! Deterministic worktree and branch naming.
//!
//! Given `(project_path, bead_id)` and a name template, the worktree path
//! and branch name are pure functions. The default template is
//! `{project}-{beadID}` and the default base is the project's parent
//! directory, making worktrees siblings of the checkout.

use std::path::{Path, PathBuf};

use az_core::types::BeadId;

/// Naming scheme for worktrees and branches.
#[derive(Debug, Clone)]
pub struct WorktreeNaming {
    /// Template with `{project}` and `{beadID}` placeholders
    template: String,
    /// Base directory; `None` means sibling of the project
    base: Option<PathBuf>,
}

impl Default for WorktreeNaming {
    fn default() -> Self {
        Self {
            template: "{project}-{beadID}".into(),
            base: None,
        }
    }
}

impl WorktreeNaming {
    /// Build a naming scheme from config values. Empty strings select the
    /// defaults.
    pub fn new(template: &str, base_path: &str) -> Self {
        Self {
            template: if template.is_empty() {
                "{project}-{beadID}".into()
            } else {
                template.into()
            },
            base: if base_path.is_empty() {
                None
            } else {
                Some(PathBuf::from(base_path))
            },
        }
    }

    /// The rendered directory name for a bead's worktree.
    pub fn dir_name(&self, project: &Path, bead: &BeadId) -> String {
        let project_name = project
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".into());
        self.template
            .replace("{project}", &project_name)
            .replace("{beadID}", bead)
    }

    /// Absolute worktree path for a bead.
    pub fn worktree_path(&self, project: &Path, bead: &BeadId) -> PathBuf {
        let base = match &self.base {
            Some(base) => base.clone(),
            None => project
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        base.join(self.dir_name(project, bead))
    }

    /// Branch name for a bead. Defaults to the bead id itself.
    pub fn branch_name(&self, bead: &BeadId) -> String {
        bead.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_renders_sibling() {
        let naming = WorktreeNaming::default();
        let path = naming.worktree_path(Path::new("/work/myapp"), &"az-12".to_string());
        assert_eq!(path, PathBuf::from("/work/myapp-az-12"));
    }

    #[test]
    fn test_custom_template_and_base() {
        let naming = WorktreeNaming::new("wt-{beadID}", "/tmp/trees");
        let path = naming.worktree_path(Path::new("/work/myapp"), &"az-9".to_string());
        assert_eq!(path, PathBuf::from("/tmp/trees/wt-az-9"));
    }

    #[test]
    fn test_deterministic() {
        let naming = WorktreeNaming::default();
        let a = naming.worktree_path(Path::new("/w/app"), &"az-1".to_string());
        let b = naming.worktree_path(Path::new("/w/app"), &"az-1".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn test_branch_name_is_bead_id() {
        let naming = WorktreeNaming::default();
        assert_eq!(naming.branch_name(&"az-42".to_string()), "az-42");
    }

    #[test]
    fn test_empty_config_values_select_defaults() {
        let naming = WorktreeNaming::new("", "");
        let path = naming.worktree_path(Path::new("/w/app"), &"az-1".to_string());
        assert_eq!(path, PathBuf::from("/w/app-az-1"));
    }
}
