//! Shared command context for CLI commands

use mr_gate::config::EngineConfig;
use mr_gate::error::Result;
use mr_gate::identity::Directory;
use std::path::Path;

/// Setup shared by every command
///
/// Loads the configuration (explicit path or the user config dir) and
/// builds the static identity directory from it.
pub struct CommandContext {
    /// Engine configuration
    pub config: EngineConfig,
    /// Identity directory from `[directory]`
    pub directory: Directory,
    /// Print JSON instead of text
    pub json: bool,
}

impl CommandContext {
    /// Load configuration and build the directory
    pub fn load(config_path: Option<&Path>, json: bool) -> Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::load_default()?,
        };
        let directory = Directory::from_config(&config.directory);
        Ok(Self {
            config,
            directory,
            json,
        })
    }
}
