//! Subcommands module for the logdna-callback CLI
//!
//! This module contains all the subcommand implementations.

pub mod config;
pub mod replay;

use anyhow::{Context, Result};
use logdna_callback::callback::config::{process_environment, LogdnaConfig, NativeConfig};
use std::path::PathBuf;
use tracing::warn;

/// Common context shared between commands
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Explicit ansible.cfg path
    pub config_path: Option<PathBuf>,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli) -> Self {
        Self {
            config_path: cli.config.clone(),
            verbosity: cli.verbosity(),
        }
    }

    /// Read the `[callback_logdna]` section of the ansible.cfg in effect.
    pub fn load_native(&self) -> Result<NativeConfig> {
        NativeConfig::load(self.config_path.as_deref())
            .context("Failed to read native configuration")
    }

    /// Merge already-read native options with the environment.
    pub fn resolve(&self, native: &NativeConfig) -> LogdnaConfig {
        let config = LogdnaConfig::resolve(native.values(), &process_environment());
        if let Err(e) = config.validate() {
            warn!("{}", e);
        }
        config
    }

    /// Resolve the callback configuration.
    pub fn load_config(&self) -> Result<LogdnaConfig> {
        Ok(self.resolve(&self.load_native()?))
    }
}
