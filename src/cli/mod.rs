//! CLI module for hchk - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the
//! service and registering it with the service manager.

pub mod commands;

pub use commands::Cli;
