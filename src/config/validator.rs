use super::KEYS;
use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

/// Warns about configuration fields that cadsync does not read
pub struct ConfigValidator {
    /// Set of valid configuration fields
    known_fields: HashSet<&'static str>,
}

impl ConfigValidator {
    /// Create a new validator with known configuration fields
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_fields: KEYS.iter().copied().collect(),
        }
    }

    /// Unknown fields in the config file at `config_path`, as dotted keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn unknown_fields(&self, config_path: &Path) -> Result<Vec<String>> {
        if !config_path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(config_path)?;
        let parsed: toml::Value = toml::from_str(&content)?;

        let mut unknown = Vec::new();
        self.check_table(&parsed, "", &mut unknown);
        Ok(unknown)
    }

    /// Validate a loaded configuration file and warn about unknown fields
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        let unknown = self.unknown_fields(config_path)?;
        if unknown.is_empty() {
            return Ok(());
        }

        eprintln!("{}", "Configuration warnings:".yellow().bold());
        for field in unknown {
            tracing::warn!(field = %field, "unknown configuration field");
            eprintln!("  Unknown configuration field: {}", field.yellow());
        }
        eprintln!();
        Ok(())
    }

    /// Recursively checks a TOML table for unknown fields
    fn check_table(&self, table: &toml::Value, prefix: &str, unknown: &mut Vec<String>) {
        let toml::Value::Table(map) = table else {
            return;
        };

        for (key, value) in map {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            if self.known_fields.contains(full_key.as_str()) {
                continue;
            }

            if let toml::Value::Table(_) = value {
                self.check_table(value, &full_key, unknown);
            } else {
                unknown.push(full_key);
            }
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
