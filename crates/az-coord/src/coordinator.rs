//! The coordinator actor.
//!
//! A single task owns the bead cache, optimistic table, command queue,
//! session manager, dev-server registry, and project registry. The UI talks
//! to it through [`CoordinatorHandle`]; every external-process call happens
//! in a background task that reports back through the actor's mailbox, so
//! state mutations stay serialized.

use std::path::PathBuf;
use std::sync::Arc;

use az_core::config::{AzConfig, MergeStrategy};
use az_core::error::{AzError, Result};
use az_core::logging::session_log_dir;
use az_core::projects::{Project, ProjectRegistry};
use az_core::types::{BeadId, BeadStatus, DevServerStatus, SessionState, now};
use az_mux::Multiplexer;
use az_session::{
    AssistantCommand, DevServerRegistry, SessionManager, SessionNames, StartOptions,
};
use az_store::{Bead, BeadPatch, BeadStore, images};
use az_worktree::Worktrees;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{DiagnosticsReport, PlanningState, Request, ToastLevel, UiMsg};
use crate::optimistic::OptimisticTable;
use crate::queue::{CommandQueue, QueueNotice};

/// Cloneable handle for sending requests and opening subscriptions.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordMsg>,
}

impl CoordinatorHandle {
    /// Send a request; dropped silently if the coordinator has exited.
    pub fn send(&self, request: Request) {
        let _ = self.tx.send(CoordMsg::Request(request));
    }

    /// Open a new event subscription. The first events on the channel are a
    /// snapshot of the current world.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UiMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(Request::Subscribe(tx));
        rx
    }
}

/// Mailbox messages: UI requests plus completions from background tasks.
enum CoordMsg {
    Request(Request),
    BeadsLoaded(Result<Vec<Bead>>),
    MoveResult {
        id: BeadId,
        target: BeadStatus,
        result: Result<Bead>,
    },
    SessionEvent(BeadId, SessionState),
    PlanningEvent(SessionState),
    DevServerChanged(BeadId, String, DevServerStatus),
    DiagnosticsReady(DiagnosticsReport),
    DiffReady {
        id: BeadId,
        additions: u64,
        deletions: u64,
        files: Vec<String>,
    },
    /// A bead was just created with the start-assistant flag; seed the
    /// cache so the work prompt is available, then start the session.
    CreatedWithStart(Box<Bead>),
    MergeProbed {
        id: BeadId,
        behind: u64,
        conflicts: Vec<String>,
    },
    /// Generic operation completion: `Ok(Some(msg))` toasts success,
    /// `Ok(None)` is silent, `Err` toasts at the error's severity.
    Done {
        result: Result<Option<String>>,
        refresh: bool,
    },
    QueueTimeout(QueueNotice),
}

/// The coordinator actor and its owned state.
pub struct Coordinator {
    config: AzConfig,
    registry: ProjectRegistry,
    project: Project,

    store: Arc<dyn BeadStore>,
    worktrees: Arc<dyn Worktrees>,
    mux: Arc<dyn Multiplexer>,
    sessions: Arc<Mutex<SessionManager>>,
    dev_servers: Arc<Mutex<DevServerRegistry>>,
    names: SessionNames,

    queue: CommandQueue,
    optimistic: OptimisticTable,
    beads: Vec<Bead>,
    subscribers: Vec<mpsc::UnboundedSender<UiMsg>>,
    planning: PlanningState,
    swept_stale: bool,

    tx: mpsc::UnboundedSender<CoordMsg>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Build the actor and all its wiring, start it, and return the handle.
    pub fn spawn(
        config: AzConfig,
        registry: ProjectRegistry,
        project: Project,
        store: Arc<dyn BeadStore>,
        worktrees: Arc<dyn Worktrees>,
        mux: Arc<dyn Multiplexer>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        // Queue timeouts surface as error toasts
        let (timeout_tx, mut timeout_rx) = mpsc::unbounded_channel();
        let queue = CommandQueue::new(config.command_timeout()).with_timeout_notices(timeout_tx);
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(notice) = timeout_rx.recv().await {
                    if tx.send(CoordMsg::QueueTimeout(notice)).is_err() {
                        return;
                    }
                }
            });
        }

        let names = SessionNames::new(&config.session.tmux_prefix);
        let sessions = Arc::new(Mutex::new(SessionManager::new(
            Arc::clone(&mux),
            Arc::clone(&worktrees),
            names.clone(),
            AssistantCommand {
                program: config.assistant_command().to_string(),
                init_commands: config.session.init_commands.clone(),
            },
            config.git.base_branch.clone(),
            session_log_dir(&config.log_dir()),
        )));
        let dev_servers = Arc::new(Mutex::new(DevServerRegistry::new(
            Arc::clone(&mux),
            names.clone(),
            config.dev_server.clone(),
        )));

        let actor = Self {
            config,
            registry,
            project,
            store,
            worktrees,
            mux,
            sessions,
            dev_servers,
            names,
            queue,
            optimistic: OptimisticTable::default(),
            beads: Vec::new(),
            subscribers: Vec::new(),
            planning: PlanningState::Input,
            swept_stale: false,
            tx: tx.clone(),
            cancel,
        };
        tokio::spawn(actor.run(rx));

        CoordinatorHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordMsg>) {
        info!("coordinator started");
        self.spawn_refresh();

        // Interval-driven refresh keeps the board honest while sessions
        // mutate the beads database from their worktrees.
        if self.config.beads.sync_interval > 0 {
            let tx = self.tx.clone();
            let period = std::time::Duration::from_secs(self.config.beads.sync_interval);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // skip the immediate first tick
                loop {
                    ticker.tick().await;
                    if tx.send(CoordMsg::Request(Request::RefreshBeads)).is_err() {
                        return;
                    }
                }
            });
        }

        while let Some(msg) = rx.recv().await {
            match msg {
                CoordMsg::Request(request) => self.handle_request(request).await,
                CoordMsg::BeadsLoaded(result) => self.on_beads_loaded(result),
                CoordMsg::MoveResult { id, target, result } => {
                    self.on_move_result(id, target, result)
                }
                CoordMsg::SessionEvent(id, state) => self.on_session_event(id, state).await,
                CoordMsg::PlanningEvent(state) => self.on_planning_event(state),
                CoordMsg::DevServerChanged(id, server, status) => {
                    self.publish(UiMsg::DevServerStateChanged(id, server, status));
                }
                CoordMsg::DiagnosticsReady(report) => {
                    self.publish(UiMsg::Diagnostics(report));
                }
                CoordMsg::DiffReady {
                    id,
                    additions,
                    deletions,
                    files,
                } => {
                    self.publish(UiMsg::DiffReady {
                        id,
                        additions,
                        deletions,
                        files,
                    });
                }
                CoordMsg::CreatedWithStart(bead) => {
                    let id = bead.id.clone();
                    if !self.beads.iter().any(|b| b.id == id) {
                        self.beads.push(*bead);
                    }
                    self.start_session(id, true, false);
                }
                CoordMsg::MergeProbed {
                    id,
                    behind,
                    conflicts,
                } => {
                    self.publish(UiMsg::RequestMergeChoice {
                        id,
                        behind,
                        conflicts,
                    });
                }
                CoordMsg::Done { result, refresh } => {
                    match result {
                        Ok(Some(message)) => self.toast(message, ToastLevel::Success),
                        Ok(None) => {}
                        Err(e) => self.toast(e.to_string(), e.severity().into()),
                    }
                    if refresh {
                        self.spawn_refresh();
                    }
                }
                CoordMsg::QueueTimeout(notice) => {
                    self.toast(
                        format!("{} for {} timed out", notice.label, notice.task_id),
                        ToastLevel::Error,
                    );
                }
            }
        }
        self.cancel.cancel();
        debug!("coordinator mailbox closed");
    }

    // =========================================================================
    // Request dispatch
    // =========================================================================

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::RefreshBeads => self.spawn_refresh(),
            Request::SwitchProject(path) => self.switch_project(path),
            Request::StartSession { id, with_work, yolo } => {
                self.start_session(id, with_work, yolo)
            }
            Request::AttachSession(id) => self.attach_session(id).await,
            Request::PauseSession(id) => self.pause_session(id),
            Request::ResumeSession(id) => self.resume_session(id),
            Request::StopSession(id) => self.stop_session(id),
            Request::ToggleDevServer { id, server } => self.dev_server_op(id, server, DevOp::Toggle),
            Request::ViewDevServer { id, server } => self.dev_server_op(id, server, DevOp::View),
            Request::RestartDevServer { id, server } => {
                self.dev_server_op(id, server, DevOp::Restart)
            }
            Request::UpdateFromMain(id) => self.update_from_main(id),
            Request::MergeToMain(id) => self.merge_to_main(id),
            Request::MergeAndAttach(id) => self.merge_and_attach(id),
            Request::AbortMerge(id) => self.abort_merge(id),
            Request::CreatePr(id) => self.create_pr(id),
            Request::DeleteCleanup(id) => self.delete_cleanup(id),
            Request::MoveTask { id, delta } => self.move_task(id, delta),
            Request::CreateBead(draft) => {
                let store = Arc::clone(&self.store);
                let project = self.project.path.clone();
                let cancel = self.cancel.child_token();
                self.spawn_done(true, async move {
                    let bead = store.create(&project, &draft, &cancel).await?;
                    Ok(Some(format!("Created {}", bead.id)))
                });
            }
            Request::CreateBeadAndStart(draft) => {
                let store = Arc::clone(&self.store);
                let project = self.project.path.clone();
                let cancel = self.cancel.child_token();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    match store.create(&project, &draft, &cancel).await {
                        Ok(bead) => {
                            let _ = tx.send(CoordMsg::Done {
                                result: Ok(Some(format!("Created {}", bead.id))),
                                refresh: true,
                            });
                            let _ = tx.send(CoordMsg::CreatedWithStart(Box::new(bead)));
                        }
                        Err(e) => {
                            let _ = tx.send(CoordMsg::Done {
                                result: Err(e),
                                refresh: false,
                            });
                        }
                    }
                });
            }
            Request::EditBead { id, patch } => {
                let store = Arc::clone(&self.store);
                let project = self.project.path.clone();
                let cancel = self.cancel.child_token();
                self.spawn_done(true, async move {
                    store.update(&project, &id, &patch, &cancel).await?;
                    Ok(None)
                });
            }
            Request::DeleteBead(id) => self.delete_bead(id),
            Request::PasteImage(id) => self.paste_image(id),
            Request::AttachFile { id, path } => {
                let project = self.project.path.clone();
                self.spawn_done(false, async move {
                    let dest = images::attach_file(&project, &id, &path)?;
                    Ok(Some(format!(
                        "Attached {}",
                        dest.file_name().unwrap_or_default().to_string_lossy()
                    )))
                });
            }
            Request::OpenImage { id: _, path } => self.open_image(path),
            Request::DeleteImage { id: _, path } => {
                self.spawn_done(false, async move {
                    images::delete_attachment(&path)?;
                    Ok(Some("Attachment deleted".into()))
                });
            }
            Request::RunPlanning(description) => self.run_planning(description),
            Request::AttachPlanningSession => {
                let mux = Arc::clone(&self.mux);
                let name = self.names.planning();
                self.spawn_done(false, async move {
                    mux.switch_client(&name).await?;
                    Ok(None)
                });
            }
            Request::ShowDiff(id) => self.show_diff(id),
            Request::RunDiagnostics => self.run_diagnostics(),
            Request::SearchBeads(query) => {
                let results: Vec<BeadId> = self
                    .beads
                    .iter()
                    .filter(|b| {
                        b.matches_query(&query)
                            || b.description
                                .as_deref()
                                .is_some_and(|d| d.to_lowercase().contains(&query.to_lowercase()))
                    })
                    .map(|b| b.id.clone())
                    .collect();
                self.publish(UiMsg::SearchResults(results));
            }
            Request::RequestQuit => {
                let labels = self.queue.running_labels();
                match labels.first() {
                    Some(label) => self.toast(
                        format!("Cannot quit: {label} in progress"),
                        ToastLevel::Warning,
                    ),
                    None => self.publish(UiMsg::QuitApproved),
                }
            }
            Request::Subscribe(tx) => {
                let _ = tx.send(UiMsg::ProjectsUpdated(self.registry.projects().to_vec()));
                let _ = tx.send(UiMsg::ProjectChanged(self.project.clone()));
                let _ = tx.send(UiMsg::TasksUpdated(self.overlaid_beads()));
                self.subscribers.push(tx);
            }
        }
    }

    // =========================================================================
    // Bead cache and optimistic pipeline
    // =========================================================================

    fn spawn_refresh(&self) {
        let store = Arc::clone(&self.store);
        let project = self.project.path.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let result = store.list(&project, &cancel).await;
            let _ = tx.send(CoordMsg::BeadsLoaded(result));
        });
    }

    fn on_beads_loaded(&mut self, result: Result<Vec<Bead>>) {
        match result {
            Ok(beads) => {
                self.optimistic.reconcile(&beads);
                self.beads = beads;
                self.publish(UiMsg::TasksUpdated(self.overlaid_beads()));
                self.maybe_sweep_stale();
            }
            Err(e) => self.toast(format!("Refresh failed: {e}"), ToastLevel::Error),
        }
    }

    fn overlaid_beads(&self) -> Vec<Bead> {
        let mut beads = self.beads.clone();
        self.optimistic.overlay(&mut beads);
        beads
    }

    fn move_task(&mut self, id: BeadId, delta: i8) {
        let Some(bead) = self.beads.iter().find(|b| b.id == id) else {
            self.toast(format!("bead not found: {id}"), ToastLevel::Warning);
            return;
        };
        let rendered = self
            .optimistic
            .get(&id)
            .map(|r| r.target)
            .unwrap_or(bead.status);
        let column = rendered.column() as i8 + delta;
        let Some(target) = BeadStatus::from_column(column.clamp(0, 3) as usize) else {
            return;
        };
        if target == rendered {
            // Board edge; nothing to do and no request to send
            return;
        }

        self.optimistic.record(id.clone(), bead.status, target);

        let store = Arc::clone(&self.store);
        let project = self.project.path.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        let move_id = id.clone();
        self.queue.enqueue(
            &id,
            "move",
            Box::pin(async move {
                let result = store
                    .update(&project, &move_id, &BeadPatch::status(target), &cancel)
                    .await;
                let _ = tx.send(CoordMsg::MoveResult {
                    id: move_id,
                    target,
                    result,
                });
            }),
        );
    }

    fn on_move_result(&mut self, id: BeadId, target: BeadStatus, result: Result<Bead>) {
        match result {
            Ok(updated) => {
                self.optimistic.clear(&id);
                if let Some(bead) = self.beads.iter_mut().find(|b| b.id == id) {
                    *bead = updated;
                }
                self.publish(UiMsg::TaskMoveSucceeded(id, target));
            }
            Err(e) => {
                self.optimistic.clear(&id);
                self.publish(UiMsg::TaskMoveFailed(id, e.to_string()));
            }
        }
    }

    fn delete_bead(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let store = Arc::clone(&self.store);
        let worktrees = Arc::clone(&self.worktrees);
        let sessions = Arc::clone(&self.sessions);
        let project = self.project.path.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        let task_id = id.clone();
        self.queue.enqueue(
            &task_id.clone(),
            "delete",
            Box::pin(async move {
                // Best-effort teardown; the delete proceeds either way
                {
                    let mut sessions = sessions.lock().await;
                    if sessions.state(&id).is_active() {
                        if let Err(e) = sessions.stop(&id).await {
                            warn!(bead = %id, error = %e, "session teardown before delete failed");
                            let _ = tx.send(CoordMsg::Done {
                                result: Err(AzError::validation(format!(
                                    "session teardown failed: {e}"
                                ))),
                                refresh: false,
                            });
                        }
                    }
                }
                if worktrees.exists(&project, &id).await {
                    if let Err(e) = worktrees.remove(&project, &id, &cancel).await {
                        warn!(bead = %id, error = %e, "worktree cleanup before delete failed");
                        let _ = tx.send(CoordMsg::Done {
                            result: Err(AzError::validation(format!(
                                "worktree cleanup failed: {e}"
                            ))),
                            refresh: false,
                        });
                    }
                }
                let result = store
                    .delete(&project, &id, &cancel)
                    .await
                    .map(|()| Some(format!("Deleted {id}")));
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: true,
                });
            }),
        );
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    fn start_session(&mut self, id: BeadId, with_work: bool, yolo: bool) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let prompt = if with_work {
            self.beads.iter().find(|b| b.id == id).map(|b| {
                match &b.description {
                    Some(desc) => format!("{}\n\n{desc}", b.title),
                    None => b.title.clone(),
                }
            })
        } else {
            None
        };
        let opts = StartOptions {
            project_path: self.project.path.clone(),
            initial_prompt: prompt,
            skip_permissions: yolo,
            model: None,
        };

        let sessions = Arc::clone(&self.sessions);
        let events = self.session_event_sender();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        let task_id = id.clone();
        self.queue.enqueue(
            &task_id,
            "start",
            Box::pin(async move {
                let result = {
                    let mut sessions = sessions.lock().await;
                    sessions.start(&id, &opts, events, &cancel).await
                };
                match result {
                    Ok(()) => {
                        let _ = tx.send(CoordMsg::SessionEvent(id.clone(), SessionState::Busy));
                        let _ = tx.send(CoordMsg::Done {
                            result: Ok(Some(format!("Started session for {id}"))),
                            refresh: false,
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(CoordMsg::Done {
                            result: Err(e),
                            refresh: false,
                        });
                    }
                }
            }),
        );
    }

    /// Channel that forwards activity monitor events into the mailbox.
    fn session_event_sender(&self) -> mpsc::UnboundedSender<(BeadId, SessionState)> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some((id, state)) = events_rx.recv().await {
                if tx.send(CoordMsg::SessionEvent(id, state)).is_err() {
                    return;
                }
            }
        });
        events_tx
    }

    async fn on_session_event(&mut self, id: BeadId, state: SessionState) {
        {
            let mut sessions = self.sessions.lock().await;
            sessions.observe(&id, state);
        }
        match state {
            SessionState::Done if self.config.notifications.completed_task => {
                self.toast(format!("{id} completed"), ToastLevel::Success);
            }
            SessionState::Error if self.config.notifications.failed_task => {
                self.toast(format!("{id} failed"), ToastLevel::Error);
            }
            _ => {}
        }
        self.publish(UiMsg::SessionStateChanged(id, state));
    }

    async fn attach_session(&mut self, id: BeadId) {
        let name = {
            let sessions = self.sessions.lock().await;
            sessions.session_name(&id).map(str::to_string)
        };
        let Some(name) = name else {
            self.toast(format!("no session for {id}"), ToastLevel::Warning);
            return;
        };
        let mux = Arc::clone(&self.mux);
        self.spawn_done(false, async move {
            mux.switch_client(&name).await?;
            Ok(None)
        });
    }

    fn pause_session(&mut self, id: BeadId) {
        self.session_op(id, "pause", SessionOp::Pause);
    }

    fn resume_session(&mut self, id: BeadId) {
        self.session_op(id, "resume", SessionOp::Resume);
    }

    fn stop_session(&mut self, id: BeadId) {
        self.session_op(id, "stop", SessionOp::Stop);
    }

    fn session_op(&mut self, id: BeadId, label: &str, op: SessionOp) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let sessions = Arc::clone(&self.sessions);
        let tx = self.tx.clone();
        let task_id = id.clone();
        self.queue.enqueue(
            &task_id,
            label,
            Box::pin(async move {
                let result = {
                    let mut sessions = sessions.lock().await;
                    match op {
                        SessionOp::Pause => sessions.pause(&id).await,
                        SessionOp::Resume => sessions.resume(&id).await,
                        SessionOp::Stop => sessions.stop(&id).await,
                    }
                };
                match result {
                    Ok(()) => {
                        let state = match op {
                            SessionOp::Pause => SessionState::Paused,
                            SessionOp::Resume => SessionState::Busy,
                            SessionOp::Stop => SessionState::Idle,
                        };
                        let _ = tx.send(CoordMsg::SessionEvent(id, state));
                        let _ = tx.send(CoordMsg::Done {
                            result: Ok(None),
                            refresh: false,
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(CoordMsg::Done {
                            result: Err(e),
                            refresh: false,
                        });
                    }
                }
            }),
        );
    }

    // =========================================================================
    // Dev servers
    // =========================================================================

    fn dev_server_op(&mut self, id: BeadId, server: String, op: DevOp) {
        let dev_servers = Arc::clone(&self.dev_servers);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = {
                let mut registry = dev_servers.lock().await;
                match op {
                    DevOp::Toggle => registry.toggle(&id, &server, &worktree).await,
                    DevOp::Restart => registry.restart(&id, &server, &worktree).await,
                    DevOp::View => registry.view(&id, &server).await,
                }
            };
            match result {
                Ok(()) => {
                    if !matches!(op, DevOp::View) {
                        let status = {
                            let registry = dev_servers.lock().await;
                            registry.status(&id, &server).status
                        };
                        let _ = tx.send(CoordMsg::DevServerChanged(id, server, status));
                    }
                }
                Err(e) => {
                    let _ = tx.send(CoordMsg::Done {
                        result: Err(e),
                        refresh: false,
                    });
                }
            }
        });
    }

    // =========================================================================
    // Git flows
    // =========================================================================

    fn update_from_main(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let base = self.config.git.base_branch.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        self.queue.enqueue(
            &id.clone(),
            "update",
            Box::pin(async move {
                let result = async {
                    if !worktree.exists() {
                        return Err(AzError::validation(format!("no worktree for {id}")));
                    }
                    worktrees.merge_from_base(&worktree, &base, &cancel).await?;
                    Ok(Some(format!("Updated {id} from {base}")))
                }
                .await;
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: false,
                });
            }),
        );
    }

    fn merge_to_main(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let project = self.project.path.clone();
        let base = self.config.git.base_branch.clone();
        // Probing against origin catches remote commits the local base
        // branch has not seen yet.
        let probe_ref = if self.config.merge.compare_with_origin {
            format!("origin/{base}")
        } else {
            base.clone()
        };
        let squash = self.config.merge.strategy == MergeStrategy::Squash;
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        let task_id = id.clone();
        self.queue.enqueue(
            &task_id,
            "merge",
            Box::pin(async move {
                if !worktree.exists() {
                    let _ = tx.send(CoordMsg::Done {
                        result: Err(AzError::validation(format!("no worktree for {id}"))),
                        refresh: false,
                    });
                    return;
                }

                // Probe before touching anything; conflicts route to a
                // user decision instead of a failed merge. A missing
                // origin ref falls back to the local base branch.
                let probed = match worktrees
                    .check_merge_conflicts(&worktree, &probe_ref, &cancel)
                    .await
                {
                    Ok(probe) => Ok(probe),
                    Err(_) if probe_ref != base => {
                        worktrees.check_merge_conflicts(&worktree, &base, &cancel).await
                    }
                    Err(e) => Err(e),
                };
                let probe = match probed {
                    Ok(probe) => probe,
                    Err(e) => {
                        let _ = tx.send(CoordMsg::Done {
                            result: Err(e),
                            refresh: false,
                        });
                        return;
                    }
                };
                if probe.has_risk {
                    let (behind, _ahead) = worktrees
                        .behind_count(&worktree, &base, &cancel)
                        .await
                        .unwrap_or((0, 0));
                    let _ = tx.send(CoordMsg::MergeProbed {
                        id,
                        behind,
                        conflicts: probe.conflicting_files,
                    });
                    return;
                }

                let result = worktrees
                    .merge_into_base(&project, &id, &base, squash, &cancel)
                    .await
                    .map(|()| Some(format!("Merged {id} into {base}")));
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: true,
                });
            }),
        );
    }

    fn merge_and_attach(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let base = self.config.git.base_branch.clone();
        let mux = Arc::clone(&self.mux);
        let session = self.names.assistant(&id);
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        self.queue.enqueue(
            &id.clone(),
            "merge",
            Box::pin(async move {
                // Bring the conflict into the worktree, then hand the user
                // (or the assistant) the session to resolve it.
                if let Err(e) = worktrees.merge_from_base(&worktree, &base, &cancel).await {
                    if !matches!(e, AzError::MergeConflict { .. }) {
                        let _ = tx.send(CoordMsg::Done {
                            result: Err(e),
                            refresh: false,
                        });
                        return;
                    }
                }
                let result = mux.switch_client(&session).await.map(|()| None);
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: false,
                });
            }),
        );
    }

    fn abort_merge(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        self.queue.enqueue(
            &id.clone(),
            "abort-merge",
            Box::pin(async move {
                let result = worktrees
                    .abort_merge(&worktree, &cancel)
                    .await
                    .map(|()| Some("Merge aborted".into()));
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: false,
                });
            }),
        );
    }

    fn create_pr(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let bead = self.beads.iter().find(|b| b.id == id).cloned();
        let draft = self.config.pr.draft_by_default;
        let auto_link = self.config.pr.auto_link;
        let update_first = !self.config.pr.create_without_merge;
        let base = self.config.git.base_branch.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        self.queue.enqueue(
            &id.clone(),
            "pr",
            Box::pin(async move {
                let result = async {
                    let Some(bead) = bead else {
                        return Err(AzError::not_found("bead", &id));
                    };
                    if update_first {
                        // Bring the branch up to date so the PR applies
                        // cleanly; a conflict here needs the session.
                        worktrees.merge_from_base(&worktree, &base, &cancel).await?;
                    }
                    run_in(&worktree, "git", &["push", "-u", "origin", id.as_str()]).await?;

                    let title = format!("{id}: {}", bead.title);
                    let mut body = bead.description.unwrap_or_default();
                    if auto_link {
                        body.push_str(&format!("\n\nBead: {id}"));
                    }
                    let mut args = vec!["pr", "create", "--title", &title, "--body", &body];
                    if draft {
                        args.push("--draft");
                    }
                    let url = run_in(&worktree, "gh", &args).await?;
                    Ok(Some(format!("PR created: {}", url.trim())))
                }
                .await;
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: false,
                });
            }),
        );
    }

    fn delete_cleanup(&mut self, id: BeadId) {
        if self.refuse_if_busy(&id) {
            return;
        }
        let worktrees = Arc::clone(&self.worktrees);
        let sessions = Arc::clone(&self.sessions);
        let project = self.project.path.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        let task_id = id.clone();
        self.queue.enqueue(
            &task_id,
            "cleanup",
            Box::pin(async move {
                {
                    let mut sessions = sessions.lock().await;
                    if sessions.state(&id).is_active() {
                        if let Err(e) = sessions.stop(&id).await {
                            let _ = tx.send(CoordMsg::Done {
                                result: Err(e),
                                refresh: false,
                            });
                            return;
                        }
                        let _ = tx.send(CoordMsg::SessionEvent(id.clone(), SessionState::Idle));
                    }
                }
                let result = worktrees
                    .remove(&project, &id, &cancel)
                    .await
                    .map(|()| Some(format!("Cleaned up {id}")));
                let _ = tx.send(CoordMsg::Done {
                    result,
                    refresh: false,
                });
            }),
        );
    }

    /// Remove worktrees of Done beads untouched for longer than `keepDays`.
    fn maybe_sweep_stale(&mut self) {
        if self.swept_stale || !self.config.worktree.auto_cleanup {
            return;
        }
        self.swept_stale = true;

        let keep_days = i64::from(self.config.worktree.keep_days);
        let stale: Vec<BeadId> = self
            .beads
            .iter()
            .filter(|b| b.status == BeadStatus::Done)
            .filter(|b| now().signed_duration_since(b.updated_at).num_days() > keep_days)
            .map(|b| b.id.clone())
            .collect();
        if stale.is_empty() {
            return;
        }

        let worktrees = Arc::clone(&self.worktrees);
        let project = self.project.path.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            for id in stale {
                if worktrees.exists(&project, &id).await {
                    match worktrees.remove(&project, &id, &cancel).await {
                        Ok(()) => info!(bead = %id, "swept stale worktree"),
                        Err(e) => warn!(bead = %id, error = %e, "stale worktree sweep failed"),
                    }
                }
            }
        });
    }

    // =========================================================================
    // Images, planning, diagnostics, projects
    // =========================================================================

    fn paste_image(&mut self, id: BeadId) {
        let dest = images::pasted_image_path(&self.project.path, &id);
        self.spawn_done(false, async move {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AzError::io("creating attachment dir", parent, e))?;
            }
            // The clipboard helper is platform-specific and external
            let helper = if cfg!(target_os = "macos") {
                ("pngpaste", vec![dest.to_string_lossy().into_owned()])
            } else {
                (
                    "sh",
                    vec![
                        "-c".to_string(),
                        format!("wl-paste -t image/png > '{}'", dest.display()),
                    ],
                )
            };
            let args: Vec<&str> = helper.1.iter().map(String::as_str).collect();
            run_in(dest.parent().unwrap_or(std::path::Path::new(".")), helper.0, &args).await?;
            Ok(Some(format!(
                "Pasted {}",
                dest.file_name().unwrap_or_default().to_string_lossy()
            )))
        });
    }

    fn open_image(&mut self, path: PathBuf) {
        let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        self.spawn_done(false, async move {
            let dir = path.parent().map(PathBuf::from).unwrap_or_default();
            run_in(&dir, opener, &[&path.to_string_lossy()]).await?;
            Ok(None)
        });
    }

    fn run_planning(&mut self, description: String) {
        let mux = Arc::clone(&self.mux);
        let name = self.names.planning();
        let assistant = self.config.assistant_command().to_string();
        let project = self.project.path.clone();
        let tx = self.tx.clone();
        let events = self.planning_event_sender();

        self.planning = PlanningState::Generating;
        self.publish(UiMsg::PlanningStateChanged(PlanningState::Generating));

        tokio::spawn(async move {
            let prompt = format!(
                "Plan the following work. Break it into steps and create a bead \
                 for each step with `bd create`:\n\n{description}"
            );
            let command = format!(
                "{assistant} {}",
                az_session::names::shell_quote(&prompt)
            );
            let result = mux
                .new_session(
                    &name,
                    &az_mux::SessionOptions {
                        cwd: Some(project),
                        command: Some(command),
                        env: Vec::new(),
                    },
                )
                .await;
            match result {
                Ok(()) => {
                    let _monitor = az_session::ActivityMonitor::spawn(
                        mux,
                        "planning".to_string(),
                        name,
                        az_session::ActivityClassifier::default(),
                        az_session::activity::DEFAULT_SAMPLE_INTERVAL,
                        events,
                    );
                    // Keep the monitor alive until the session disappears
                    std::mem::forget(_monitor);
                }
                Err(e) => {
                    let _ = tx.send(CoordMsg::PlanningEvent(SessionState::Error));
                    let _ = tx.send(CoordMsg::Done {
                        result: Err(e),
                        refresh: false,
                    });
                }
            }
        });
    }

    fn planning_event_sender(&self) -> mpsc::UnboundedSender<(BeadId, SessionState)> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some((_, state)) = events_rx.recv().await {
                if tx.send(CoordMsg::PlanningEvent(state)).is_err() {
                    return;
                }
            }
        });
        events_tx
    }

    fn on_planning_event(&mut self, state: SessionState) {
        let mapped = match state {
            SessionState::Busy => PlanningState::Generating,
            SessionState::Waiting => PlanningState::Reviewing,
            SessionState::Done => PlanningState::Complete,
            SessionState::Error => PlanningState::Error,
            SessionState::Idle | SessionState::Paused => return,
        };
        if mapped != self.planning {
            self.planning = mapped;
            self.publish(UiMsg::PlanningStateChanged(mapped));
            if mapped == PlanningState::Complete {
                self.spawn_refresh();
            }
        }
    }

    fn show_diff(&mut self, id: BeadId) {
        let worktrees = Arc::clone(&self.worktrees);
        let worktree = self.worktrees.path_of(&self.project.path, &id);
        let base = self.config.git.base_branch.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            match worktrees.diff_stats(&worktree, &base, &cancel).await {
                Ok(stats) => {
                    let _ = tx.send(CoordMsg::DiffReady {
                        id,
                        additions: stats.additions,
                        deletions: stats.deletions,
                        files: stats.files,
                    });
                }
                Err(e) => {
                    let _ = tx.send(CoordMsg::Done {
                        result: Err(e),
                        refresh: false,
                    });
                }
            }
        });
    }

    fn run_diagnostics(&mut self) {
        let project = self.project.clone();
        let worktree_base = self
            .worktrees
            .path_of(&self.project.path, &"x".to_string())
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let log_file = self.config.log_dir().join("az.log");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let report = DiagnosticsReport {
                bd_version: version_of("bd", "--version").await,
                git_version: version_of("git", "--version").await,
                tmux_version: version_of("tmux", "-V").await,
                project_name: project.name,
                project_path: project.path,
                worktree_base,
                log_file,
            };
            let _ = tx.send(CoordMsg::DiagnosticsReady(report));
        });
    }

    fn switch_project(&mut self, path: PathBuf) {
        match self.registry.by_path(&path).cloned() {
            Some(project) => {
                info!(project = %project.name, "switched project");
                self.project = project.clone();
                self.optimistic = OptimisticTable::default();
                self.beads.clear();
                self.publish(UiMsg::ProjectChanged(project));
                self.spawn_refresh();
            }
            None => self.toast(
                format!("unknown project: {}", path.display()),
                ToastLevel::Warning,
            ),
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Publish an event to every live subscriber.
    fn publish(&mut self, msg: UiMsg) {
        self.subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
    }

    fn toast(&mut self, message: String, level: ToastLevel) {
        self.publish(UiMsg::Toast(message, level));
    }

    /// Refuse with a busy toast when the task queue has a running entry.
    /// Returns true when refused.
    fn refuse_if_busy(&mut self, id: &BeadId) -> bool {
        match self.queue.running_label(id) {
            Some(label) => {
                let e = AzError::busy(id.clone(), label);
                self.toast(e.to_string(), ToastLevel::Warning);
                true
            }
            None => false,
        }
    }

    /// Spawn an unqueued background operation reporting through `Done`.
    fn spawn_done(
        &self,
        refresh: bool,
        fut: impl std::future::Future<Output = Result<Option<String>>> + Send + 'static,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(CoordMsg::Done { result, refresh });
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum SessionOp {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum DevOp {
    Toggle,
    Restart,
    View,
}

/// Run an external command in a directory, returning stdout.
async fn run_in(dir: &std::path::Path, program: &str, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| AzError::unavailable(program, &e))?;
    if !output.status.success() {
        return Err(AzError::command(
            program,
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First line of `program arg` output, or None when unavailable.
async fn version_of(program: &str, arg: &str) -> Option<String> {
    let output = tokio::process::Command::new(program)
        .arg(arg)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}
