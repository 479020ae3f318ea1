//! Engine configuration loaded from `config.toml`.

use crate::error::{Error, Result};
use crate::types::{MergeStyle, Team, User};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name for mrgate configuration within the user config dir.
const CONFIG_DIR: &str = "mrgate";

/// Filename for the configuration file.
const CONFIG_FILE: &str = "config.toml";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Merge request settings
    pub pull_request: PullRequestConfig,
    /// Merge execution settings
    pub merge: MergeConfig,
    /// Static identity directory (used by the CLI)
    pub directory: DirectoryConfig,
}

/// Merge request settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestConfig {
    /// Title prefixes marking a request as work in progress (case-insensitive)
    pub work_in_progress_prefixes: Vec<String>,
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            work_in_progress_prefixes: vec!["WIP:".to_string(), "[WIP]".to_string()],
        }
    }
}

/// Merge execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Styles the engine accepts
    pub allowed_styles: Vec<MergeStyle>,
    /// Style used when none is given
    pub default_style: MergeStyle,
    /// Cap on `Reviewed-by:` trailers; 0 disables them, negative means unlimited
    pub max_approvers_in_message: i64,
    /// Only official approvals produce `Reviewed-by:` trailers
    pub official_approvers_only_in_message: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            allowed_styles: MergeStyle::ALL.to_vec(),
            default_style: MergeStyle::Merge,
            max_approvers_in_message: 10,
            official_approvers_only_in_message: true,
        }
    }
}

impl MergeConfig {
    /// Whether the style is enabled
    pub fn allows(&self, style: MergeStyle) -> bool {
        self.allowed_styles.contains(&style)
    }
}

/// Static identity directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Known users
    pub users: Vec<User>,
    /// Known organization names
    pub orgs: Vec<String>,
    /// Known teams
    pub teams: Vec<Team>,
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.merge.allowed_styles.is_empty() {
            return Err(Error::Config(
                "merge.allowed_styles must not be empty".to_string(),
            ));
        }
        if !self.merge.allows(self.merge.default_style) {
            return Err(Error::Config(format!(
                "merge.default_style '{}' is not in merge.allowed_styles",
                self.merge.default_style
            )));
        }
        Ok(())
    }
}

/// Default configuration path (`<config dir>/mrgate/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
