//! CLI module for logdna-callback
//!
//! This module provides the command-line interface: argument parsing and
//! subcommand dispatch for inspecting the resolved configuration and
//! replaying recorded event streams.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// logdna-callback - Stream playbook run events to LogDNA
///
/// Resolves the `[callback_logdna]` section of ansible.cfg and `LOGDNA_*`
/// environment variables, then forwards task results to the ingestion API.
#[derive(Parser, Debug, Clone)]
#[command(name = "logdna-callback")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Stream playbook run events to LogDNA", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to ansible.cfg (overrides the standard lookup)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit diagnostics as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the resolved callback configuration
    Config(commands::config::ConfigArgs),

    /// Forward a recorded JSON-lines event stream
    Replay(commands::replay::ReplayArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
