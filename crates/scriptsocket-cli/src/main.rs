//! scriptsocket CLI - main entry point

use clap::Parser;
use tracing::{error, info};

use scriptsocket_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration; flags override file values
    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(cli.verbose);
            error!("{}", e);
            std::process::exit(2);
        }
    };
    config.apply_overrides(&cli);

    // Initialize logging
    setup_logging(config.logging.verbose);

    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(2);
    }

    if let Err(e) = CommandDispatcher::execute(cli.command, &config).await {
        error!("{}", e);
        if let Some(hint) = e.hint() {
            info!("{}", hint);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
