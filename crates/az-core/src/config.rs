//! Configuration loading for azedarach.
//!
//! Config is resolved per project: `.azedarach.json` in the project root,
//! falling back to an `azedarach` key in `package.json`, falling back to
//! built-in defaults. Files carry a `version` field; older versions are
//! migrated forward, a future version is a fatal error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AzError, Result};

/// Highest config version this build understands.
pub const CONFIG_VERSION: u32 = 1;

/// Where a loaded configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// `.azedarach.json` in the project root
    File,
    /// `azedarach` key of the project's `package.json`
    PackageJson,
    /// Built-in defaults (no file found)
    #[default]
    Defaults,
}

impl ConfigSource {
    /// Human-readable label for the settings overlay.
    pub fn label(&self) -> &'static str {
        match self {
            Self::File => ".azedarach.json",
            Self::PackageJson => "package.json",
            Self::Defaults => "defaults",
        }
    }
}

/// Git workflow behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitConfig {
    /// Branch to branch from and merge into
    pub base_branch: String,
    /// "worktree" or "branch"
    pub workflow_mode: WorkflowMode,
    /// Strategy when merging a bead branch back
    pub default_merge_strategy: MergeStrategy,
    /// Include diff stats in the detail view
    pub show_line_changes: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_branch: "main".into(),
            workflow_mode: WorkflowMode::Worktree,
            default_merge_strategy: MergeStrategy::Merge,
            show_line_changes: true,
        }
    }
}

/// Isolation model for in-progress beads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    #[default]
    Worktree,
    Branch,
}

/// Merge strategy for bringing a bead branch back to base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Merge,
    Rebase,
    Squash,
}

/// AI assistant launch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Override for the assistant command; empty means use `cliTool`
    pub command: String,
    /// Shell used to run the assistant command
    pub shell: String,
    /// Multiplexer session name prefix for assistant sessions
    pub tmux_prefix: String,
    /// External command timeout in milliseconds
    pub timeout_ms: u64,
    /// Directory for azedarach logs; empty means `~/.azedarach/logs`
    pub log_dir: String,
    /// Commands run in the session before the assistant starts
    pub init_commands: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            shell: "sh".into(),
            tmux_prefix: "ai-".into(),
            timeout_ms: 30_000,
            log_dir: String::new(),
            init_commands: Vec::new(),
        }
    }
}

/// Pull-request creation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrConfig {
    pub draft_by_default: bool,
    pub auto_link: bool,
    pub notify_after_create: bool,
    pub create_without_merge: bool,
}

impl Default for PrConfig {
    fn default() -> Self {
        Self {
            draft_by_default: false,
            auto_link: true,
            notify_after_create: true,
            create_without_merge: false,
        }
    }
}

/// Merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeConfig {
    pub strategy: MergeStrategy,
    pub auto_merge: bool,
    pub compare_with_origin: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::Merge,
            auto_merge: false,
            compare_with_origin: true,
        }
    }
}

/// A named dev server definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevServerDef {
    /// Name used in `dev-<bead-id>-<name>` session names
    pub name: String,
    /// Command run inside the bead's worktree
    pub command: String,
    /// Extra environment variables
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}

/// Dev server registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevServerConfig {
    pub base_port: u16,
    pub max_port: u16,
    /// Shared environment variables applied to every server
    pub environments: std::collections::BTreeMap<String, String>,
    pub servers: Vec<DevServerDef>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            base_port: 3000,
            max_port: 3999,
            environments: Default::default(),
            servers: Vec::new(),
        }
    }
}

/// Worktree layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorktreeConfig {
    /// Base directory for worktrees; empty means sibling of the project
    pub base_path: String,
    /// Name template; `{project}` and `{beadID}` placeholders
    pub name_format: String,
    /// Sweep worktrees of Done beads at startup
    pub auto_cleanup: bool,
    /// Age threshold for the sweep, in days
    pub keep_days: u32,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            name_format: "{project}-{beadID}".into(),
            auto_cleanup: false,
            keep_days: 7,
        }
    }
}

/// Background probe cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub check_interval: u64,
    pub offline_timeout: u64,
    pub retry_attempts: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            check_interval: 30,
            offline_timeout: 10,
            retry_attempts: 3,
        }
    }
}

/// Toast/notification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfig {
    pub completed_task: bool,
    pub failed_task: bool,
    pub error_threshold: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            completed_task: true,
            failed_task: true,
            error_threshold: 3,
        }
    }
}

/// Source-of-truth location for the beads database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeadsConfig {
    /// Path of the beads database, relative to the project root; empty means
    /// `bd`'s own default
    pub path: String,
    /// Automatic refresh interval in seconds; 0 disables
    pub sync_interval: u64,
}

impl Default for BeadsConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            sync_interval: 30,
        }
    }
}

/// Full azedarach configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzConfig {
    /// Config schema version
    pub version: u32,
    /// Which AI assistant command to invoke (e.g. "claude", "opencode")
    pub cli_tool: String,
    pub git: GitConfig,
    pub session: SessionConfig,
    pub pr: PrConfig,
    pub merge: MergeConfig,
    pub dev_server: DevServerConfig,
    pub worktree: WorktreeConfig,
    pub network: NetworkConfig,
    pub notifications: NotificationConfig,
    pub beads: BeadsConfig,
    /// Theme name
    pub theme: String,
    /// Where this configuration was loaded from
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Default for AzConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            cli_tool: "claude".into(),
            git: Default::default(),
            session: Default::default(),
            pr: Default::default(),
            merge: Default::default(),
            dev_server: Default::default(),
            worktree: Default::default(),
            network: Default::default(),
            notifications: Default::default(),
            beads: Default::default(),
            theme: "default".into(),
            source: ConfigSource::Defaults,
        }
    }
}

impl AzConfig {
    /// Load the configuration for a project directory.
    ///
    /// Resolution order: `.azedarach.json`, then the `azedarach` key of
    /// `package.json`, then defaults. Parse failures are fatal; a missing
    /// file is not.
    pub fn load(project_root: &Path) -> Result<Self> {
        let file = project_root.join(".azedarach.json");
        if file.exists() {
            let raw = std::fs::read_to_string(&file)
                .map_err(|e| AzError::io("reading config", &file, e))?;
            let value: Value =
                serde_json::from_str(&raw).map_err(|e| AzError::ConfigInvalid {
                    path: file.clone(),
                    message: e.to_string(),
                })?;
            let mut cfg = Self::from_value(value, &file)?;
            cfg.source = ConfigSource::File;
            info!(path = %file.display(), "loaded configuration");
            return Ok(cfg);
        }

        let pkg = project_root.join("package.json");
        if pkg.exists() {
            let raw = std::fs::read_to_string(&pkg)
                .map_err(|e| AzError::io("reading package.json", &pkg, e))?;
            // A broken package.json is not ours to report; fall through.
            if let Ok(value) = serde_json::from_str::<Value>(&raw) {
                if let Some(section) = value.get("azedarach") {
                    let mut cfg = Self::from_value(section.clone(), &pkg)?;
                    cfg.source = ConfigSource::PackageJson;
                    info!(path = %pkg.display(), "loaded configuration from package.json");
                    return Ok(cfg);
                }
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Parse, version-gate, and migrate a raw config value.
    fn from_value(mut value: Value, path: &Path) -> Result<Self> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;

        if version > CONFIG_VERSION {
            return Err(AzError::ConfigFutureVersion {
                path: path.to_path_buf(),
                version,
                supported: CONFIG_VERSION,
            });
        }

        for from in version..CONFIG_VERSION {
            migrate(&mut value, from);
        }

        let mut cfg: AzConfig =
            serde_json::from_value(value).map_err(|e| AzError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        cfg.version = CONFIG_VERSION;
        Ok(cfg)
    }

    /// The effective assistant command: explicit session command, else the
    /// top-level tool name.
    pub fn assistant_command(&self) -> &str {
        if self.session.command.is_empty() {
            &self.cli_tool
        } else {
            &self.session.command
        }
    }

    /// Effective log directory.
    pub fn log_dir(&self) -> PathBuf {
        if self.session.log_dir.is_empty() {
            default_state_dir().join("logs")
        } else {
            PathBuf::from(&self.session.log_dir)
        }
    }

    /// External command timeout.
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.session.timeout_ms)
    }
}

/// Apply the migration from `from` to `from + 1` in place.
fn migrate(value: &mut Value, from: u32) {
    if from == 0 {
        // v0 kept the assistant tool under session.cli
        if let Some(tool) = value
            .get("session")
            .and_then(|s| s.get("cli"))
            .and_then(Value::as_str)
            .map(str::to_owned)
        {
            if value.get("cliTool").is_none() {
                value["cliTool"] = Value::String(tool);
            }
            if let Some(session) = value.get_mut("session").and_then(Value::as_object_mut) {
                session.remove("cli");
            }
        }
        debug!("migrated configuration v0 -> v1");
    }
}

/// Azedarach's own state directory (`~/.azedarach`).
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".azedarach")
}
