//! Shared domain types for the Reflex project.

pub mod config;
pub mod events;
pub mod render;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod time;

mod errors;

pub use errors::{ReflexError, Result};
