//! The coordinator: an actor mediating between the UI and the external
//! world, with per-task operation serialization and optimistic mutations.

pub mod coordinator;
pub mod events;
pub mod optimistic;
pub mod queue;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use events::{DiagnosticsReport, PlanningState, Request, ToastLevel, UiMsg};
pub use optimistic::{OptimisticRecord, OptimisticTable};
pub use queue::{CommandQueue, QueueNotice};
