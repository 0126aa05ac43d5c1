//! Layered settings: built-in defaults, then a TOML file, then `APBATCH__*`
//! environment variables (`APBATCH__SSH__TIMEOUT_SECS=60`).

use anyhow::{Context, Result};
use apbatch_core::application::strategy::risk::DEFAULT_RISK_PATTERNS;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_DB_PATH: &str = "~/.apbatch/inventory.db";
const ENV_PREFIX: &str = "APBATCH";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    /// `pretty` or `json`
    pub log_format: String,
    /// Daily rolling log files are written here when set
    pub log_dir: Option<String>,
    pub ping: PingConfig,
    pub ssh: SshConfig,
    pub browser: BrowserConfig,
    pub risk_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DB_PATH.to_string(),
            log_format: "pretty".to_string(),
            log_dir: None,
            ping: PingConfig::default(),
            ssh: SshConfig::default(),
            browser: BrowserConfig::default(),
            risk_patterns: DEFAULT_RISK_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub program: String,
    pub count: u32,
    pub timeout_ms: u64,
    pub parallelism: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            count: 4,
            timeout_ms: 2000,
            parallelism: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub ssh_program: String,
    pub sshpass_program: String,
    pub connect_timeout_secs: u64,
    pub strict_host_keys: bool,
    pub timeout_secs: u64,
    pub parallelism: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
            connect_timeout_secs: 10,
            strict_host_keys: false,
            timeout_secs: 30,
            parallelism: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub use_https: bool,
    pub tab_budget: usize,
    pub timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            use_https: false,
            tab_budget: 5,
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or the platform config file when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(Some(path), true, None),
            None => {
                let default = default_config_file();
                Self::load_from(default.as_deref(), false, None)
            }
        }
    }

    /// `env` replaces the process environment (tests)
    fn load_from(
        path: Option<&Path>,
        required: bool,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(required));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        );

        let settings = builder.build().context("Failed to read configuration")?;
        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Database path with `~` and `$VARS` expanded
    pub fn database_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.database_path)
            .with_context(|| format!("Cannot expand database path {}", self.database_path))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }

    pub fn log_dir(&self) -> Result<Option<PathBuf>> {
        self.log_dir
            .as_deref()
            .map(|dir| {
                shellexpand::full(dir)
                    .map(|d| PathBuf::from(d.into_owned()))
                    .with_context(|| format!("Cannot expand log directory {}", dir))
            })
            .transpose()
    }
}

/// `<platform config dir>/apbatch/config.toml`
fn default_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "apbatch").map(|dirs| dirs.config_dir().join("config.toml"))
}
