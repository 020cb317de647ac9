//! Error handling for the scriptsocket CLI

use thiserror::Error;

use scriptsocket_core::{BindError, ClientError, StagingError};

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Server failed to start: {0}")]
    Bind(#[from] BindError),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Suggested next step for the operator, when there is an obvious one
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Bind(BindError::PortInUse { .. }) => {
                Some("Another program is using that port; pick a different one with --port")
            }
            CliError::Bind(BindError::InvalidPort { .. }) => {
                Some("Ports range from 0 to 65535; 0 picks any free port")
            }
            CliError::Client(ClientError::ConnectionRefused { .. }) => {
                Some("Nothing is listening there; start the server or check --host and --port")
            }
            CliError::Client(ClientError::ConnectionTimeout { .. }) => Some(
                "The server did not answer in time; it may be busy, firewalled, or unable to stage content",
            ),
            CliError::Client(ClientError::EmptyPayload) => {
                Some("Select or pipe in some content before sending")
            }
            _ => None,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
