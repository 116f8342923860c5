//! Configuration management for taskmirror.
//!
//! This module handles loading, parsing, and validation of configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub git: GitConfig,
    pub logging: LoggingConfig,
    pub github: GithubConfig,
    pub shortcut: ShortcutConfig,
}

/// Local task store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON task store file
    pub path: PathBuf,
}

/// Sync configuration shared by all remote services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Label scoping which remote items belong to this tool
    pub label: String,
}

/// Local git repository configuration, used for commit verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Directory of the repository commits are verified against
    pub repo_dir: PathBuf,
    /// Remote default branch commits must be reachable from
    pub default_branch: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging to the data-dir log file
    pub enabled: bool,
    /// Log level: "error", "warn", "info", "debug" or "trace"
    pub level: String,
}

/// GitHub Issues integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub enabled: bool,
    pub owner: String,
    pub repo: String,
    /// Environment variable holding the API token
    pub token_env: String,
}

/// Shortcut Stories integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutConfig {
    pub enabled: bool,
    /// Environment variable holding the API token
    pub token_env: String,
    /// Workflow state id stories are created in
    pub open_state_id: u64,
    /// Workflow state id representing "done"
    pub done_state_id: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".taskmirror/tasks.json"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            label: "taskmirror".to_string(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            default_branch: "main".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            owner: String::new(),
            repo: String::new(),
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_env: "SHORTCUT_API_TOKEN".to_string(),
            open_state_id: 0,
            done_state_id: 0,
        }
    }
}

impl Config {
    /// Load configuration from file or return defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;

        if let Some(path) = config_path {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in order of precedence
    fn find_config_file() -> Result<Option<PathBuf>> {
        // 1. Check current directory
        let current_dir_config = PathBuf::from("taskmirror.toml");
        if current_dir_config.exists() {
            return Ok(Some(current_dir_config));
        }

        // 2. Check XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("taskmirror").join("config.toml");
            if xdg_config.exists() {
                return Ok(Some(xdg_config));
            }
        }

        Ok(None)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sync.label.is_empty() {
            anyhow::bail!("sync.label cannot be empty");
        }
        if self.sync.label.contains(|c: char| c.is_whitespace() || c == ':') {
            anyhow::bail!("sync.label cannot contain whitespace or ':', got '{}'", self.sync.label);
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "logging.level must be one of {}, got '{}'",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        if self.github.enabled {
            if self.github.owner.is_empty() || self.github.repo.is_empty() {
                anyhow::bail!("github.owner and github.repo are required when the GitHub integration is enabled");
            }
            if self.github.token_env.is_empty() {
                anyhow::bail!("github.token_env cannot be empty");
            }
        }

        if self.shortcut.enabled {
            if self.shortcut.token_env.is_empty() {
                anyhow::bail!("shortcut.token_env cannot be empty");
            }
            if self.shortcut.open_state_id == 0 || self.shortcut.done_state_id == 0 {
                anyhow::bail!(
                    "shortcut.open_state_id and shortcut.done_state_id are required when the Shortcut integration is enabled"
                );
            }
        }

        if self.git.default_branch.is_empty() {
            anyhow::bail!("git.default_branch cannot be empty");
        }

        Ok(())
    }

    /// Generate default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Self::default();
        let toml_content = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

        // Add header comment
        let header = format!(
            "# taskmirror Configuration File\n# Generated on {}\n\n",
            chrono::Local::now().format("%Y-%m-%d")
        );

        let full_content = header + &toml_content;

        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(&path, full_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        println!("Default configuration written to: {}", path.as_ref().display());
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn get_xdg_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
            .map(|dir| dir.join("taskmirror"))
    }

    /// Get the default config file path
    pub fn get_default_config_path() -> Result<PathBuf> {
        Ok(Self::get_xdg_config_dir()?.join("config.toml"))
    }
}
