//! Messages consumed by the update function.
//!
//! Everything that can change the model arrives as a `Msg`: routed key
//! intents, coordinator events, and system events. The update function
//! produces exactly one `(Model, Effect)` pair per variant.

use az_core::types::{BeadStatus, IssueType, Priority, SessionState};
use az_coord::UiMsg;
use az_store::SortField;

/// Messages driving the pure update loop.
#[derive(Debug, Clone)]
pub enum Msg {
    // =====================================================================
    // Navigation
    // =====================================================================
    MoveCursor { dx: i8, dy: i16 },
    HalfPage { down: bool },
    /// Jump to a board position: (column, task index)
    JumpTo { column: usize, task: usize },

    // =====================================================================
    // Mode transitions
    // =====================================================================
    EnterSelect,
    ToggleSelect,
    ExitMode,
    EnterGoto,
    GotoKey(char),
    OpenActionMenu,
    EnterSearch,
    EnterSortMenu,
    EnterFilterMenu,
    EnterOrchestrate,
    OrchestrateKey(char),
    MergeSelectKey(char),

    // =====================================================================
    // Text input
    // =====================================================================
    InputChar(char),
    InputBackspace,
    InputCommit,

    // =====================================================================
    // Filters and sort
    // =====================================================================
    SetSort(SortField),
    ToggleFilterStatus(BeadStatus),
    ToggleFilterPriority(Priority),
    ToggleFilterType(IssueType),
    ToggleFilterSession(SessionState),
    ToggleHideEpicChildren,
    SetAgeFilter(Option<u32>),
    ClearFilters,
    /// Key pressed inside the top-level filter menu (submenu selection)
    OverlayKeyFilter(char),

    // =====================================================================
    // Overlay navigation
    // =====================================================================
    CloseOverlay,
    OverlayUp,
    OverlayDown,
    OverlaySelect,
    Confirm,
    Deny,
    MergeChoiceKey(char),

    // =====================================================================
    // Board actions (captured task from Action mode, else cursor task)
    // =====================================================================
    StartSession { with_work: bool, yolo: bool },
    AttachSession,
    PauseSession,
    ResumeSession,
    StopSession,
    DevServerToggle,
    DevServerRestart,
    DevServerView,
    UpdateFromMain,
    MergeToMain,
    AbortMerge,
    ShowDiff,
    CreatePr,
    RequestCleanup,
    RequestDeleteBead,
    MoveTask(i8),
    OpenDetail,
    EditBead,
    CreateBead { with_assistant: bool },
    AttachImage,
    ListImages,

    // =====================================================================
    // Top-level overlays
    // =====================================================================
    OpenHelp,
    OpenSettings,
    OpenDiagnostics,
    OpenLogs { lines: Vec<String> },
    OpenProjectSelector,
    OpenPlanning,
    ToggleViewMode,

    // =====================================================================
    // Coordinator events and system
    // =====================================================================
    Coord(UiMsg),
    ToastExpired(u64),
    Tick,
    Resize(u16, u16),
    QuitRequested,
    ForceQuit,
}
