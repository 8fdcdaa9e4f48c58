pub mod parser;
pub mod validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    /// Exclusion rules for project scans
    #[serde(default)]
    pub scan: ScanConfig,

    /// Polling intervals of the background watchers
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root of the canonical (network) tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
    /// Directory holding the project and user index stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
    /// Root of this user's local replica
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// Username override; the login name is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
    #[serde(default = "default_backup_extensions")]
    pub backup_extensions: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

/// Intervals are humantime strings such as `"1s"` or `"500ms"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_session_poll_interval")]
    pub session_poll_interval: String,
    #[serde(default = "default_drain_interval")]
    pub drain_interval: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            index_dir: None,
            local_root: default_local_root(),
            user: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            temp_prefix: default_temp_prefix(),
            backup_extensions: default_backup_extensions(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            session_poll_interval: default_session_poll_interval(),
            drain_interval: default_drain_interval(),
        }
    }
}

impl WatchConfig {
    /// How often the project store's modification time is checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval string does not parse.
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_interval("watch.poll_interval", &self.poll_interval)
    }

    /// How often the CAD session is asked for its active document.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval string does not parse.
    pub fn session_poll_interval(&self) -> Result<Duration> {
        parse_interval("watch.session_poll_interval", &self.session_poll_interval)
    }

    /// How often the control loop drains the watcher queues.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval string does not parse.
    pub fn drain_interval(&self) -> Result<Duration> {
        parse_interval("watch.drain_interval", &self.drain_interval)
    }
}

/// Parses a humantime interval, rejecting zero.
///
/// # Errors
///
/// Returns an error if `value` is not a valid, non-zero duration.
pub fn parse_interval(key: &str, value: &str) -> Result<Duration> {
    let interval = humantime::parse_duration(value)
        .with_context(|| format!("Invalid interval for {key}: {value}"))?;
    if interval.is_zero() {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(interval)
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot read or parse the configuration file
    /// - Configuration file contains invalid TOML or invalid values
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            // Create default config if it doesn't exist
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// Root of the canonical tree.
    ///
    /// # Errors
    ///
    /// Returns an error if `core.project_root` has not been set.
    pub fn project_root(&self) -> Result<&Path> {
        self.core.project_root.as_deref().context(
            "No project root configured. Run 'cadsync update <ROOT>' or 'cadsync config core.project_root <ROOT>'",
        )
    }

    /// Directory holding the index stores: `core.index_dir`, or
    /// `.cadsync` inside the project root.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is configured.
    pub fn index_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.core.index_dir {
            return Ok(dir.clone());
        }
        Ok(self.project_root()?.join(crate::INDEX_DIR_NAME))
    }

    /// Get a configuration value by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return None;
        }

        match (parts[0], parts[1]) {
            ("core", "project_root") => self.core.project_root.as_ref().map(|p| p.display().to_string()),
            ("core", "index_dir") => self.core.index_dir.as_ref().map(|p| p.display().to_string()),
            ("core", "local_root") => Some(self.core.local_root.display().to_string()),
            ("core", "user") => self.core.user.clone(),
            ("scan", "temp_prefix") => Some(self.scan.temp_prefix.clone()),
            ("scan", "backup_extensions") => Some(self.scan.backup_extensions.join(",")),
            ("scan", "ignore_patterns") => Some(self.scan.ignore_patterns.join(",")),
            ("scan", "follow_symlinks") => Some(self.scan.follow_symlinks.to_string()),
            ("watch", "poll_interval") => Some(self.watch.poll_interval.clone()),
            ("watch", "session_poll_interval") => Some(self.watch.session_poll_interval.clone()),
            ("watch", "drain_interval") => Some(self.watch.drain_interval.clone()),
            _ => None,
        }
    }

    /// Set a configuration value by key
    ///
    /// List values take a comma-separated string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown
    /// - The value is invalid for the key (e.g., unparseable interval)
    pub fn set(&mut self, key: &str, value: String) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        }

        match (parts[0], parts[1]) {
            ("core", "project_root") => {
                self.core.project_root = Some(crate::utils::expand_tilde(&value)?);
            }
            ("core", "index_dir") => self.core.index_dir = Some(crate::utils::expand_tilde(&value)?),
            ("core", "local_root") => self.core.local_root = crate::utils::expand_tilde(&value)?,
            ("core", "user") => {
                if value.trim().is_empty() {
                    return Err(anyhow::anyhow!("User name cannot be empty"));
                }
                self.core.user = Some(value);
            }
            ("scan", "temp_prefix") => self.scan.temp_prefix = value,
            ("scan", "backup_extensions") => self.scan.backup_extensions = split_list(&value),
            ("scan", "ignore_patterns") => {
                let patterns = split_list(&value);
                for pattern in &patterns {
                    glob::Pattern::new(pattern)
                        .with_context(|| format!("Invalid ignore pattern: {pattern}"))?;
                }
                self.scan.ignore_patterns = patterns;
            }
            ("scan", "follow_symlinks") => {
                self.scan.follow_symlinks = value
                    .parse()
                    .with_context(|| format!("Invalid boolean: {value}"))?;
            }
            ("watch", field @ ("poll_interval" | "session_poll_interval" | "drain_interval")) => {
                parse_interval(key, &value)?;
                match field {
                    "poll_interval" => self.watch.poll_interval = value,
                    "session_poll_interval" => self.watch.session_poll_interval = value,
                    _ => self.watch.drain_interval = value,
                }
            }
            _ => return Err(anyhow::anyhow!("Unknown configuration key: {key}")),
        }
        Ok(())
    }

    /// Unset a configuration value by key
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown or cannot be unset
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() != 2 {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        }

        match (parts[0], parts[1]) {
            ("core", "project_root") => self.core.project_root = None,
            ("core", "index_dir") => self.core.index_dir = None,
            ("core", "user") => self.core.user = None,
            ("scan", "ignore_patterns") => self.scan.ignore_patterns.clear(),
            _ => return Err(anyhow::anyhow!("Cannot unset configuration key: {key}")),
        }
        Ok(())
    }

    /// Every key that currently has a value, in a stable order.
    #[must_use]
    pub fn list(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }
}

/// All settable configuration keys.
pub const KEYS: &[&str] = &[
    "core.project_root",
    "core.index_dir",
    "core.local_root",
    "core.user",
    "scan.temp_prefix",
    "scan.backup_extensions",
    "scan.ignore_patterns",
    "scan.follow_symlinks",
    "watch.poll_interval",
    "watch.session_poll_interval",
    "watch.drain_interval",
];

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Default functions for serde
fn default_local_root() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("cadsync")
        .join("vault")
}

fn default_temp_prefix() -> String {
    "~".to_string()
}

fn default_backup_extensions() -> Vec<String> {
    vec!["bak".to_string()]
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_session_poll_interval() -> String {
    "500ms".to_string()
}

fn default_drain_interval() -> String {
    "100ms".to_string()
}
