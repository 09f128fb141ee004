//! Shared types, configuration and errors for the ackloop crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::AckloopConfig;
pub use error::{AckloopError, Result};
pub use types::*;
