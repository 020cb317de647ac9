//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on (serve) or connect to (test, send)
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    pub port: Option<i64>,

    /// Host the test and send commands connect to
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Milliseconds to wait for a connection and for an acknowledgment
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Directory the server stages received content in
    #[arg(long, global = true)]
    pub staging_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the server and stage received content until Ctrl+C
    Serve,
    /// Send a test message to check that a server is reachable
    Test,
    /// Send script content to a server
    Send {
        /// File holding the content; standard input when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print an example configuration file, or write it to `--output`
    Config {
        /// Write the example here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
