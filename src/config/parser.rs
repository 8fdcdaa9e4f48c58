use super::{Config, parse_interval};
use anyhow::{Context, Result};
use std::path::Path;

/// Reads, parses and validates a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or holds
/// invalid values.
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML config")?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    parse_interval("watch.poll_interval", &config.watch.poll_interval)?;
    parse_interval("watch.session_poll_interval", &config.watch.session_poll_interval)?;
    parse_interval("watch.drain_interval", &config.watch.drain_interval)?;

    for pattern in &config.scan.ignore_patterns {
        glob::Pattern::new(pattern)
            .with_context(|| format!("Invalid ignore pattern: {pattern}"))?;
    }

    if config.core.user.as_deref().is_some_and(|u| u.trim().is_empty()) {
        anyhow::bail!("core.user cannot be empty");
    }

    Ok(())
}
