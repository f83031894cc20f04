//! Terminal multiplexer adapter.
//!
//! Session naming is opaque here; callers pass fully-qualified names like
//! `ai-az-12` or `dev-az-12-web`.

pub mod tmux;

pub use tmux::{Multiplexer, PopupOptions, SessionOptions, TmuxCli};
