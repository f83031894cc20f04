//! The azedarach TUI: a pure model→view→update loop over the kanban board,
//! with a stacked mode machine, an input router, and an effect system
//! interpreted by the runtime against the coordinator.

pub mod app;
pub mod effect;
pub mod input;
pub mod mode;
pub mod model;
pub mod msg;
pub mod theme;
pub mod toast;
pub mod update;
pub mod view;

pub use app::App;
pub use effect::Effect;
pub use mode::{Mode, Overlay, PendingAction};
pub use model::{Cursor, Model};
pub use msg::Msg;
pub use update::update;
