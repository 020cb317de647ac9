//! scriptsocket CLI library
//!
//! Command parsing, configuration loading and the command handlers behind
//! the `scriptsocket` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod provider;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
