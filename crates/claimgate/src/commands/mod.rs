//! CLI command handlers.

pub mod login;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use claimgate_config::ClaimgateConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration from the explicit file or the discovered layers.
    pub fn load_config(&self) -> Result<ClaimgateConfig> {
        if let Some(path) = &self.config_path {
            return claimgate_config::load_config_file(path)
                .with_context(|| format!("Failed to load {}", path.display()));
        }

        let loaded = claimgate_config::load_config(None)?;
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        if self.verbose {
            for path in loaded.loaded_from() {
                tracing::debug!(path = %path.display(), "Loaded config");
            }
        }
        Ok(loaded.config)
    }
}
