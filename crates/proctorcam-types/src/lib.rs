//! Shared domain types for the proctorcam workspace.

pub mod config;
pub mod events;
pub mod frame;
pub mod snapshot;
pub mod telemetry;

mod errors;

pub use errors::{ProctorError, Result};
