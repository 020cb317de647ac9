//! Command handlers for the scriptsocket CLI
//!
//! Each subcommand maps onto one core operation: `serve` onto
//! `Server::start`/`Server::stop`, `test` and `send` onto the outbound
//! clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use scriptsocket_core::{
    ContentProvider, SendClient, Server, ServerState, StagingStore, TestClient, TracingLogSink,
};

use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::Result;
use crate::provider::{FileContent, StdinContent};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands, config: &AppConfig) -> Result<()> {
        match command {
            Commands::Serve => Self::handle_serve_command(config).await,
            Commands::Test => Self::handle_test_command(config).await,
            Commands::Send { file } => Self::handle_send_command(config, file).await,
            Commands::Config { output } => Self::handle_config_command(output),
        }
    }

    /// Run the server until interrupted
    async fn handle_serve_command(config: &AppConfig) -> Result<()> {
        let staging = Arc::new(match &config.server.staging_dir {
            Some(dir) => StagingStore::new(dir)?,
            None => StagingStore::process_scoped()?,
        });

        let server = Server::new(
            config.server_config(),
            Arc::clone(&staging),
            Arc::new(TracingLogSink),
        );
        let handle = server.start(config.server.port).await?;

        println!("Listening on {}", handle.local_addr());
        println!("Staging received content at {}", staging.path().display());
        println!("Press Ctrl+C to stop...");

        let mut states = server.subscribe();
        let watcher = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().clone();
                match state {
                    ServerState::Connected { peer, .. } => info!("Peer connected: {}", peer),
                    ServerState::Listening { addr } => info!("Waiting for a peer on {}", addr),
                    ServerState::Stopped => debug!("Server stopped"),
                }
            }
        });

        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, stopping server");

        server.stop().await;
        watcher.abort();
        Ok(())
    }

    /// Check that a server is reachable
    async fn handle_test_command(config: &AppConfig) -> Result<()> {
        let client = TestClient::new(config.client_config()?);
        let ack = client.send().await?;

        println!(
            "Test message acknowledged by {} in {} ms",
            client.config().addr(),
            ack.round_trip.as_millis()
        );
        Ok(())
    }

    /// Send content from a file or standard input
    async fn handle_send_command(config: &AppConfig, file: Option<PathBuf>) -> Result<()> {
        let provider: Arc<dyn ContentProvider> = match file {
            Some(path) => Arc::new(FileContent::new(path)),
            None => Arc::new(StdinContent),
        };

        let client = SendClient::new(config.client_config()?);
        let ack = client.send(provider).await?;

        println!(
            "Content delivered to {} in {} ms",
            client.config().addr(),
            ack.round_trip.as_millis()
        );
        Ok(())
    }

    /// Print the example configuration, or save it to `output`
    fn handle_config_command(output: Option<PathBuf>) -> Result<()> {
        match output {
            Some(path) => Self::write_example_config(&path),
            None => {
                print!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    fn write_example_config(path: &Path) -> Result<()> {
        AppConfig::example().save_to_file(path)?;
        println!("Example configuration written to {}", path.display());
        Ok(())
    }
}
