//! Bead storage: the bead entity, the `bd` CLI adapter, and the pure
//! filter/sort pipeline that shapes the board.
//!
//! Beads are owned by the external `bd` tracker. This crate performs no
//! caching of its own; callers hold a snapshot and refresh it explicitly.

pub mod bd;
pub mod bead;
pub mod filter;
pub mod images;

pub use bd::{BdCli, BeadStore, DependencyKind};
pub use bead::{Bead, BeadDraft, BeadPatch};
pub use filter::{FilterState, SortField, apply_filters, apply_sort, columns};
