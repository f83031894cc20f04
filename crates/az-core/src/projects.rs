//! Project registry.
//!
//! A project is a name and a filesystem path that must be a git working
//! directory. The registry lives at `~/.azedarach/projects.json` and holds
//! exactly one default project. The current working directory resolves to a
//! registered project by longest path prefix.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::default_state_dir;
use crate::error::{AzError, Result};

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

impl Project {
    /// Returns true if the project path contains a `.git` entry
    /// (directory for a normal checkout, file for a worktree/submodule).
    pub fn is_git_repo(&self) -> bool {
        self.path.join(".git").exists()
    }
}

/// On-disk registry format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    default_project: Option<String>,
}

/// Registry of known projects with exactly one default.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
    default_name: Option<String>,
    path: PathBuf,
}

impl ProjectRegistry {
    /// Default registry file path (`~/.azedarach/projects.json`).
    pub fn default_path() -> PathBuf {
        default_state_dir().join("projects.json")
    }

    /// Load the registry from `path`, or an empty registry if the file does
    /// not exist. A corrupt file is fatal.
    pub fn load(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no project registry, starting empty");
            return Ok(Self {
                projects: Vec::new(),
                default_name: None,
                path,
            });
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|e| AzError::io("reading project registry", &path, e))?;
        let file: RegistryFile = serde_json::from_str(&raw).map_err(|e| AzError::Registry {
            message: format!("corrupt registry at {}: {e}", path.display()),
        })?;

        for project in &file.projects {
            if !project.is_git_repo() {
                return Err(AzError::NotARepository {
                    path: project.path.clone(),
                });
            }
        }

        Ok(Self {
            projects: file.projects,
            default_name: file.default_project,
            path,
        })
    }

    /// Persist the registry.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AzError::io("creating registry directory", parent, e))?;
        }
        let file = RegistryFile {
            projects: self.projects.clone(),
            default_project: self.default_name.clone(),
        };
        let raw = serde_json::to_string_pretty(&file)
            .map_err(|e| AzError::internal(format!("serializing registry: {e}")))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| AzError::io("writing project registry", &self.path, e))
    }

    /// All registered projects.
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// The default project, if one is registered.
    pub fn default_project(&self) -> Option<&Project> {
        match &self.default_name {
            Some(name) => self.projects.iter().find(|p| &p.name == name),
            None => self.projects.first(),
        }
    }

    /// Register a project. The first registered project becomes the default.
    pub fn add(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Result<()> {
        let project = Project {
            name: name.into(),
            path: path.into(),
        };
        if !project.is_git_repo() {
            return Err(AzError::NotARepository { path: project.path });
        }
        if self.projects.iter().any(|p| p.name == project.name) {
            return Err(AzError::validation(format!(
                "project already registered: {}",
                project.name
            )));
        }
        if self.projects.is_empty() {
            self.default_name = Some(project.name.clone());
        }
        self.projects.push(project);
        Ok(())
    }

    /// Set the default project by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.projects.iter().any(|p| p.name == name) {
            return Err(AzError::not_found("project", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Resolve a directory to a registered project by longest path prefix.
    ///
    /// A directory inside a project's worktree does not match here; only the
    /// project tree itself. Ties cannot occur because prefixes of distinct
    /// registered paths have distinct lengths.
    pub fn resolve(&self, cwd: &Path) -> Option<&Project> {
        self.projects
            .iter()
            .filter(|p| cwd.starts_with(&p.path))
            .max_by_key(|p| p.path.as_os_str().len())
    }

    /// Look up a project by exact path.
    pub fn by_path(&self, path: &Path) -> Option<&Project> {
        self.projects.iter().find(|p| p.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_dir(root: &Path, name: &str) -> PathBuf {
        let path = root.join(name);
        std::fs::create_dir_all(path.join(".git")).unwrap();
        path
    }

    fn registry(root: &Path) -> ProjectRegistry {
        ProjectRegistry::load(root.join("projects.json")).unwrap()
    }

    #[test]
    fn test_empty_registry_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let reg = registry(dir.path());
        assert!(reg.projects().is_empty());
        assert!(reg.default_project().is_none());
    }

    #[test]
    fn test_first_project_becomes_default() {
        let dir = TempDir::new().unwrap();
        let a = git_dir(dir.path(), "alpha");
        let b = git_dir(dir.path(), "beta");

        let mut reg = registry(dir.path());
        reg.add("alpha", &a).unwrap();
        reg.add("beta", &b).unwrap();
        assert_eq!(reg.default_project().unwrap().name, "alpha");

        reg.set_default("beta").unwrap();
        assert_eq!(reg.default_project().unwrap().name, "beta");
    }

    #[test]
    fn test_add_rejects_non_git_path() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        std::fs::create_dir_all(&plain).unwrap();

        let mut reg = registry(dir.path());
        let err = reg.add("plain", &plain).unwrap_err();
        assert!(matches!(err, AzError::NotARepository { .. }));
    }

    #[test]
    fn test_add_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let a = git_dir(dir.path(), "alpha");
        let mut reg = registry(dir.path());
        reg.add("alpha", &a).unwrap();
        assert!(reg.add("alpha", &a).is_err());
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let dir = TempDir::new().unwrap();
        let outer = git_dir(dir.path(), "outer");
        let inner = git_dir(dir.path(), "outer/packages/inner");

        let mut reg = registry(dir.path());
        reg.add("outer", &outer).unwrap();
        reg.add("inner", &inner).unwrap();

        let cwd = inner.join("src");
        assert_eq!(reg.resolve(&cwd).unwrap().name, "inner");
        assert_eq!(reg.resolve(&outer.join("src")).unwrap().name, "outer");
        assert!(reg.resolve(dir.path()).is_none());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let a = git_dir(dir.path(), "alpha");

        let mut reg = registry(dir.path());
        reg.add("alpha", &a).unwrap();
        reg.save().unwrap();

        let reloaded = registry(dir.path());
        assert_eq!(reloaded.projects().len(), 1);
        assert_eq!(reloaded.default_project().unwrap().name, "alpha");
    }

    #[test]
    fn test_corrupt_registry_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("projects.json"), "{oops").unwrap();
        let err = ProjectRegistry::load(dir.path().join("projects.json")).unwrap_err();
        assert!(err.is_fatal());
    }
}
