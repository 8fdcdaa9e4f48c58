//! Utility functions and helpers.
//!
//! - Path manipulation (tilde expansion, separator normalisation)
//! - Copying and removing vault objects
//! - Read-only protection
//! - Index file encoding
//! - User information retrieval
//!
//! # Submodules
//!
//! - [`files`]: Copy and remove helpers that keep timestamps and permissions straight
//! - [`paths`]: Path manipulation
//! - [`permissions`]: Read-only protection
//! - [`serialization`]: Binary serialization

/// Copy and removal of vault objects
pub mod files;
/// Path manipulation and resolution utilities
pub mod paths;
/// Read-only protection
pub mod permissions;
/// Binary serialization utilities
pub mod serialization;

use anyhow::Result;
use chrono::NaiveDateTime;
use std::path::PathBuf;

/// Expands a path starting with `~` to the user's home directory.
///
/// # Errors
///
/// Returns an error if the path is empty.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        anyhow::bail!("Path cannot be empty");
    }
    if path.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return Ok(home.join(&path[2..]));
    }
    Ok(PathBuf::from(path))
}

/// Retrieves the login name of the current user, falling back to "unknown".
///
/// Environment variables are consulted in the order `LOGNAME`, `USER`,
/// `LNAME`, `USERNAME`.
#[must_use]
pub fn get_current_user() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Username to act as: the configured override or the login name.
#[must_use]
pub fn get_user_from_config(config: &crate::config::Config) -> String {
    config
        .core
        .user
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(get_current_user)
}

/// Formats an index timestamp for display.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
