//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - debug/run: run the service loop
//! - install/remove: register or unregister the service
//! - start/stop: ask the service manager to start or stop it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hchk - makes a HTTP request to a URL every minute for a healthcheck
#[derive(Parser, Debug)]
#[command(name = "hchk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Healthcheck URL, required with debug, run and install
    #[arg(short, long, global = true)]
    pub url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run in the foreground, logging to stderr and reading commands from stdin
    Debug,

    /// Run under the service manager, logging to a file
    Run,

    /// Install the service unit
    Install,

    /// Remove the service unit
    Remove,

    /// Start the installed service
    Start,

    /// Stop the installed service
    Stop,
}

impl Commands {
    /// Whether this command needs a healthcheck URL
    pub fn needs_url(&self) -> bool {
        matches!(self, Commands::Debug | Commands::Run | Commands::Install)
    }
}
