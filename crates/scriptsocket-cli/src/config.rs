//! scriptsocket CLI Configuration Management
//!
//! Settings come from, in increasing priority:
//! - built-in defaults
//! - a TOML file (`--config <path>`, else `<config dir>/scriptsocket/config.toml`)
//! - command line flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scriptsocket_core::config::{DEFAULT_BIND_HOST, DEFAULT_FLUSH_TIMEOUT};
use scriptsocket_core::{validate_port, ClientConfig, ServerConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT};

use crate::cli::Cli;

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the scriptsocket CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listening side
    pub server: ServerSettings,

    /// Test and send clients
    pub client: ClientSettings,

    /// Log output
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to listen on; 0 picks any free port
    pub port: i64,

    /// Interface to bind
    pub bind_host: String,

    /// Where received content is staged; a per-process temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    /// Bounded wait for in-flight writes when a session closes
    pub flush_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Host running the receiving server
    pub host: String,

    /// Port the receiving server listens on
    pub port: i64,

    /// Wait for connect and for the acknowledgment
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log at DEBUG instead of INFO
    pub verbose: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT as i64,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            staging_dir: None,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT as i64,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load from `path` if given, else from the default location when a file
    /// exists there, else use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match Self::default_config_path() {
            Some(default_path) if default_path.exists() => Self::load_from_file(default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/scriptsocket/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scriptsocket").join("config.toml"))
    }

    /// Save configuration to a specific file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?).map_err(io_error)
    }

    /// Apply command line flags on top of file values
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
            self.client.port = port;
        }
        if let Some(host) = &cli.host {
            self.client.host = host.clone();
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            self.client.timeout_ms = timeout_ms;
        }
        if let Some(dir) = &cli.staging_dir {
            self.server.staging_dir = Some(dir.clone());
        }
        if cli.verbose {
            self.logging.verbose = true;
        }
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port(self.server.port)
            .map_err(|e| ConfigError::Validation(format!("server.port: {}", e)))?;
        validate_port(self.client.port)
            .map_err(|e| ConfigError::Validation(format!("client.port: {}", e)))?;

        if self.client.host.trim().is_empty() {
            return Err(ConfigError::Validation("client.host must not be empty".to_string()));
        }
        if self.client.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "client.timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_bind_host(self.server.bind_host.clone())
            .with_flush_timeout(Duration::from_millis(self.server.flush_timeout_ms))
    }

    /// Settings for the test and send clients. Port 0 is only meaningful
    /// to a listener, so it is rejected here rather than in `validate`.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let port = validate_port(self.client.port)
            .map_err(|e| ConfigError::Validation(format!("client.port: {}", e)))?;
        if port == 0 {
            return Err(ConfigError::Validation(
                "client.port: cannot connect to port 0".to_string(),
            ));
        }
        Ok(ClientConfig::new(self.client.host.clone(), port)
            .with_timeout(Duration::from_millis(self.client.timeout_ms)))
    }

    /// Defaults with every optional setting filled in
    pub fn example() -> Self {
        AppConfig {
            server: ServerSettings {
                staging_dir: Some(PathBuf::from("/tmp/scriptsocket")),
                ..ServerSettings::default()
            },
            ..AppConfig::default()
        }
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::example())
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
