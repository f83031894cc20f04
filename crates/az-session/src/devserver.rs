//! Named dev-server lifecycles bound to a bead's worktree.
//!
//! Each configured server runs in its own multiplexer session
//! `dev-<bead-id>-<server>`. Port allocation is advisory: a deterministic
//! hash of the bead id probed for availability, exported to the server via
//! `PORT`; the server binds whatever it actually selects.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use az_core::config::{DevServerConfig, DevServerDef};
use az_core::error::{AzError, Result};
use az_core::types::{BeadId, DevServerStatus};
use az_mux::{Multiplexer, SessionOptions};
use tracing::{debug, info, instrument};

use crate::names::SessionNames;

/// Public state of one `(bead, server)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevServerState {
    pub status: DevServerStatus,
    pub port: Option<u16>,
    pub session_name: Option<String>,
}

/// Registry of dev servers across beads.
pub struct DevServerRegistry {
    mux: Arc<dyn Multiplexer>,
    names: SessionNames,
    config: DevServerConfig,
    table: HashMap<(BeadId, String), DevServerState>,
}

impl DevServerRegistry {
    pub fn new(mux: Arc<dyn Multiplexer>, names: SessionNames, config: DevServerConfig) -> Self {
        Self {
            mux,
            names,
            config,
            table: HashMap::new(),
        }
    }

    /// The configured server definitions.
    pub fn definitions(&self) -> &[DevServerDef] {
        &self.config.servers
    }

    /// State for one server; missing entry means Stopped.
    pub fn status(&self, bead: &BeadId, server: &str) -> DevServerState {
        self.table
            .get(&(bead.clone(), server.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// All configured servers with their state for a bead.
    pub fn servers_for(&self, bead: &BeadId) -> Vec<(String, DevServerState)> {
        self.config
            .servers
            .iter()
            .map(|def| (def.name.clone(), self.status(bead, &def.name)))
            .collect()
    }

    /// Snapshot of every non-stopped server.
    pub fn running(&self) -> Vec<(BeadId, String, DevServerState)> {
        self.table
            .iter()
            .filter(|(_, state)| state.status != DevServerStatus::Stopped)
            .map(|((bead, server), state)| (bead.clone(), server.clone(), state.clone()))
            .collect()
    }

    /// Start if stopped, stop otherwise.
    #[instrument(level = "info", skip_all, fields(bead = %bead, server = %server))]
    pub async fn toggle(&mut self, bead: &BeadId, server: &str, worktree: &Path) -> Result<()> {
        match self.status(bead, server).status {
            DevServerStatus::Stopped | DevServerStatus::Error => {
                self.start(bead, server, worktree).await
            }
            _ => self.stop(bead, server).await,
        }
    }

    /// Stop then start.
    pub async fn restart(&mut self, bead: &BeadId, server: &str, worktree: &Path) -> Result<()> {
        if self.status(bead, server).status != DevServerStatus::Stopped {
            self.stop(bead, server).await?;
        }
        self.start(bead, server, worktree).await
    }

    /// Switch the user's client to the server's session.
    pub async fn view(&self, bead: &BeadId, server: &str) -> Result<()> {
        let state = self.status(bead, server);
        match state.session_name {
            Some(name) => self.mux.switch_client(&name).await,
            None => Err(AzError::validation(format!(
                "dev server {server} is not running for {bead}"
            ))),
        }
    }

    async fn start(&mut self, bead: &BeadId, server: &str, worktree: &Path) -> Result<()> {
        let def = self
            .config
            .servers
            .iter()
            .find(|d| d.name == server)
            .cloned()
            .ok_or_else(|| AzError::not_found("dev server", server))?;

        let session = self.names.dev_server(bead, server);
        if self.mux.has_session(&session).await? {
            return Err(AzError::SessionExists { name: session });
        }

        let port = suggest_port(bead, self.config.base_port, self.config.max_port);

        let mut env: Vec<(String, String)> = self
            .config
            .environments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.extend(def.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(port) = port {
            env.push(("PORT".into(), port.to_string()));
        }

        self.mux
            .new_session(
                &session,
                &SessionOptions {
                    cwd: Some(worktree.to_path_buf()),
                    command: Some(def.command.clone()),
                    env,
                },
            )
            .await?;

        self.table.insert(
            (bead.clone(), server.to_string()),
            DevServerState {
                status: DevServerStatus::Running,
                port,
                session_name: Some(session),
            },
        );
        info!(?port, "dev server started");
        Ok(())
    }

    async fn stop(&mut self, bead: &BeadId, server: &str) -> Result<()> {
        let key = (bead.clone(), server.to_string());
        if let Some(state) = self.table.remove(&key) {
            if let Some(session) = state.session_name {
                self.mux.kill_session(&session).await?;
            }
        }
        debug!("dev server stopped");
        Ok(())
    }

    /// Record a status observed externally (e.g. the session died).
    pub fn observe(&mut self, bead: &BeadId, server: &str, status: DevServerStatus) {
        let key = (bead.clone(), server.to_string());
        match status {
            DevServerStatus::Stopped => {
                self.table.remove(&key);
            }
            status => {
                self.table.entry(key).or_default().status = status;
            }
        }
    }
}

/// Deterministic advisory port for a bead: `base + fnv1a(id) mod span`,
/// linear-probed for local availability. `None` when no port in the span
/// can be bound; the server then picks its own.
pub fn suggest_port(bead: &BeadId, base: u16, max: u16) -> Option<u16> {
    if max <= base {
        return None;
    }
    let span = u32::from(max - base);
    let start = fnv1a(bead.as_bytes()) % span;
    (0..span)
        .map(|offset| base + u16::try_from((start + offset) % span).unwrap_or(0))
        .find(|port| port_free(*port))
}

fn port_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
