use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ponci_core::CgroupConfig;
use serde::{Deserialize, Serialize};

/// Main configuration for the ponci CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Cgroup mount, procfs and polling settings
    #[serde(default)]
    pub cgroup: CgroupConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset (default: "warn")
    #[serde(default = "default_level")]
    pub level: String,

    /// Also write daily-rotated logs here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// File name prefix inside `log_dir` (default: ponci.log)
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_log_file() -> String {
    "ponci.log".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: None,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use ponci_cli::config::Config;
    ///
    /// let config = Config::load_from_file("/etc/ponci/config.toml").unwrap();
    /// println!("poll interval: {} ms", config.cgroup.poll_interval_ms);
    /// ```
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(&mut self, prefix: Option<PathBuf>, timeout: Option<Duration>) {
        if let Some(prefix) = prefix {
            self.cgroup.prefix = Some(prefix);
        }
        if let Some(timeout) = timeout {
            self.cgroup = self.cgroup.clone().with_wait_timeout(timeout);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.cgroup.validate().map_err(|e| e.to_string())?;

        if self.logging.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        if self.logging.log_file.trim().is_empty() {
            return Err("Log file name cannot be empty".to_string());
        }

        Ok(())
    }
}
