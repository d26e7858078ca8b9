//! Engine configuration.
//!
//! Loaded from `hotswap.toml` in the engine base directory, falling back to
//! defaults plus environment variable overrides. All fields have serde
//! defaults so a partial config file is fine.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "hotswap.toml";
pub const CATALOG_FILENAME: &str = "personas.json";
pub const BACKUP_DIR_NAME: &str = "backups";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix character(s) that trigger commands (e.g. "!coder").
    #[serde(default = "default_keyword_prefix")]
    pub keyword_prefix: String,
    /// Comma-separated keywords that reset to default behavior.
    #[serde(default = "default_reset_keywords")]
    pub reset_keywords: String,
    /// Keyword (without prefix) that lists available personas.
    #[serde(default = "default_list_keyword")]
    pub list_keyword: String,
    /// Keyword (without prefix) that imports a remote catalog.
    #[serde(default = "default_download_keyword")]
    pub download_keyword: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Keep the selected persona active across turns until changed.
    #[serde(default = "default_true")]
    pub persistent_persona: bool,
    /// Comma-separated hosts allowed as import sources (exact or suffix match).
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: String,
    /// Repository used by the download command when no URL is given.
    #[serde(default)]
    pub default_repository_url: Option<String>,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,
    /// Number of backup snapshots retained, oldest pruned first.
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
    /// Write the built-in catalog on first use if none exists.
    #[serde(default = "default_true")]
    pub create_default_config: bool,
    /// Keep well-formed entries of an import whose other entries fail
    /// validation. Default is all-or-nothing.
    #[serde(default)]
    pub lenient_import: bool,
    /// Override for the catalog document path.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

fn default_keyword_prefix() -> String {
    "!".to_string()
}

fn default_reset_keywords() -> String {
    "reset,default,normal".to_string()
}

fn default_list_keyword() -> String {
    "list".to_string()
}

fn default_download_keyword() -> String {
    "download_personas".to_string()
}

fn default_trusted_domains() -> String {
    "raw.githubusercontent.com".to_string()
}

fn default_download_timeout_secs() -> u64 {
    30
}

fn default_max_download_bytes() -> usize {
    1_048_576
}

fn default_backup_count() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keyword_prefix: default_keyword_prefix(),
            reset_keywords: default_reset_keywords(),
            list_keyword: default_list_keyword(),
            download_keyword: default_download_keyword(),
            case_sensitive: false,
            persistent_persona: true,
            trusted_domains: default_trusted_domains(),
            default_repository_url: None,
            download_timeout_secs: default_download_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
            backup_count: default_backup_count(),
            create_default_config: true,
            lenient_import: false,
            catalog_path: None,
        }
    }
}

impl EngineConfig {
    /// Base directory for config, catalog and backups.
    pub fn base_dir() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("hotswap"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_path() -> PathBuf {
        Self::base_dir().join(CONFIG_FILENAME)
    }

    /// Load config from hotswap.toml, falling back to defaults + env vars.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<EngineConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config.with_env_overrides();
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::default().with_env_overrides()
    }

    /// Save config to file in the base directory.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir {:?}", parent))?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(prefix) = env::var("HOTSWAP_KEYWORD_PREFIX") {
            if !prefix.trim().is_empty() {
                self.keyword_prefix = prefix;
            }
        }

        if let Ok(domains) = env::var("HOTSWAP_TRUSTED_DOMAINS") {
            if !domains.trim().is_empty() {
                self.trusted_domains = domains;
            }
        }

        if let Ok(url) = env::var("HOTSWAP_DEFAULT_REPOSITORY_URL") {
            if !url.trim().is_empty() {
                self.default_repository_url = Some(url);
            }
        }

        if let Ok(path) = env::var("HOTSWAP_CATALOG_PATH") {
            if !path.trim().is_empty() {
                self.catalog_path = Some(path);
            }
        }

        if let Ok(timeout) = env::var("HOTSWAP_DOWNLOAD_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse() {
                self.download_timeout_secs = seconds;
            }
        }

        if let Ok(persistent) = env::var("HOTSWAP_PERSISTENT_PERSONA") {
            self.persistent_persona = persistent.eq_ignore_ascii_case("1")
                || persistent.eq_ignore_ascii_case("true")
                || persistent.eq_ignore_ascii_case("yes");
        }

        self
    }

    /// Resolved path of the catalog document.
    pub fn resolved_catalog_path(&self) -> PathBuf {
        match &self.catalog_path {
            Some(path) => PathBuf::from(path),
            None => Self::base_dir().join(CATALOG_FILENAME),
        }
    }

    pub fn reset_keyword_list(&self) -> Vec<String> {
        split_keyword_list(&self.reset_keywords)
    }

    pub fn trusted_domain_list(&self) -> Vec<String> {
        split_keyword_list(&self.trusted_domains)
    }
}

fn split_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty())
        .collect()
}
