//! The `calctl` command-line interface.
//!
//! Manages calendar events from the terminal and exposes the same operations
//! as JSON tools for a tool-calling host.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
