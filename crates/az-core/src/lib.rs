//! Core types and infrastructure shared across azedarach crates.
//!
//! This crate holds the pieces every other crate leans on: the [`AzError`]
//! taxonomy, the shared domain enums ([`types`]), configuration loading
//! ([`config`]), the project registry ([`projects`]), and tracing setup
//! ([`logging`]).

pub mod config;
pub mod error;
pub mod logging;
pub mod projects;
pub mod types;

pub use config::AzConfig;
pub use error::{AzError, Result};
pub use logging::{LogGuard, init_logging};
pub use projects::{Project, ProjectRegistry};
