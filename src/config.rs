use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::registry::RepositoryMapping;

/// Main configuration structure for hgmirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Canonical Mercurial host every source path is resolved against
    #[serde(default = "default_hg_base_url")]
    pub hg_base_url: String,

    /// Directory holding the Mercurial working copies
    #[serde(default = "default_hg_cache")]
    pub hg_cache: String,

    /// Directory holding the bare Git repositories
    #[serde(default = "default_git_cache")]
    pub git_cache: String,

    /// Statically mirrored repositories
    #[serde(default = "default_repositories")]
    pub repositories: Vec<RepositoryMapping>,

    /// Extra push targets per destination name, on top of the GitHub remote
    #[serde(default)]
    pub additional_remotes: HashMap<String, Vec<String>>,

    /// Canonical module list settings
    #[serde(default)]
    pub modules: ModuleListConfig,

    /// GitHub organization and authentication settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// hg-git conversion settings
    #[serde(default)]
    pub convert: ConvertConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the canonical module list lives and how to read it
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModuleListConfig {
    /// Module list endpoint; no dynamic modules are added when unset
    pub url: Option<String>,

    /// Response shape of the endpoint
    #[serde(default)]
    pub format: ModuleListFormat,

    /// Source path prefix for discovered modules
    #[serde(default = "default_module_prefix")]
    pub path_prefix: String,
}

/// Module list response shapes
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModuleListFormat {
    /// One module identifier per line
    #[default]
    Plain,
    /// An HTML index page, one module per table row
    Html,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Organization owning the mirrors
    #[serde(default = "default_organization")]
    pub organization: String,

    /// GitHub username (prompted if null)
    pub username: Option<String>,

    /// SSH host used to build push URLs
    #[serde(default = "default_ssh_host")]
    pub ssh_host: String,

    /// API base URL override (GitHub Enterprise)
    pub api_url: Option<String>,

    /// Environment variable consulted for the secret before prompting
    pub token_env: Option<String>,
}

/// Conversion configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConvertConfig {
    /// Exit status of `hg push` meaning "no changes found"
    #[serde(default = "default_no_change_exit_code")]
    pub no_change_exit_code: i32,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum repositories processed at once within a stage
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_hg_base_url() -> String {
    "http://hg.tryton.org".to_string()
}
fn default_hg_cache() -> String {
    "hg".to_string()
}
fn default_git_cache() -> String {
    "git".to_string()
}
fn default_repositories() -> Vec<RepositoryMapping> {
    vec![
        RepositoryMapping::new("trytond", "trytond"),
        RepositoryMapping::new("tryton", "tryton"),
        RepositoryMapping::new("modules/party", "party"),
    ]
}
fn default_module_prefix() -> String {
    "modules".to_string()
}
fn default_organization() -> String {
    "tryton".to_string()
}
fn default_ssh_host() -> String {
    "github.com".to_string()
}
fn default_no_change_exit_code() -> i32 {
    1
}
fn default_max_parallel() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for ModuleListConfig {
    fn default() -> Self {
        Self {
            url: None,
            format: ModuleListFormat::default(),
            path_prefix: default_module_prefix(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            username: None,
            ssh_host: default_ssh_host(),
            api_url: None,
            token_env: None,
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            no_change_exit_code: default_no_change_exit_code(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;
            config.expand_paths()?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("hgmirror").join("config.yml"))
    }

    /// Expand environment variables in cache paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.hg_cache = shellexpand::full(&self.hg_cache)
            .context("Failed to expand hg_cache path")?
            .into_owned();

        self.git_cache = shellexpand::full(&self.git_cache)
            .context("Failed to expand git_cache path")?
            .into_owned();

        Ok(())
    }

    /// Extra remotes configured for a destination repository
    pub fn additional_remotes_for(&self, destination_name: &str) -> &[String] {
        self.additional_remotes
            .get(destination_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hg_base_url: default_hg_base_url(),
            hg_cache: default_hg_cache(),
            git_cache: default_git_cache(),
            repositories: default_repositories(),
            additional_remotes: HashMap::new(),
            modules: ModuleListConfig::default(),
            github: GitHubConfig::default(),
            convert: ConvertConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
