// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Report counters cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # cadsync - check-out/check-in vault for shared CAD trees
//!
//! cadsync keeps a canonical tree of CAD documents on a shared location and
//! mirrors it into a read-only local replica per user. A user edits a
//! document by checking it out (`unregister`), which makes the local copy
//! writable and marks the document as held; checking it back in
//! (`register`) publishes the edit to the canonical tree.
//!
//! ## Architecture
//!
//! - [`mapping`]: canonical path <-> local replica path translation
//! - [`storage`]: index entries and the locked, file-backed index store
//! - [`scanner`]: canonical tree walk with transient-file exclusion
//! - [`indexer`]: rescans the canonical tree into the project index
//! - [`sync`]: reconciles a user's replica against the project index
//! - [`registration`]: the check-out / check-in state machine
//! - [`documents`]: open, create, delete documents and folders
//! - [`watch`]: polling watchers and the control loop
//! - [`cad`]: the CAD application seam
//! - [`commands`]: CLI command implementations
//!
//! ## Example Usage
//!
//! ```no_run
//! use cadsync::vault::Vault;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let vault = Vault::open(Path::new("/srv/CAD/.cadsync"), "/home/alice/Vault", "alice")?;
//! vault.reindex(Path::new("/srv/CAD"))?;
//! let report = vault.sync_to_local()?;
//! println!("{} objects created", report.created);
//! # Ok(())
//! # }
//! ```

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// CAD application seam.
pub mod cad;

/// CLI command implementations.
pub mod commands;

/// Configuration parsing, validation, and management.
pub mod config;

/// Document and folder operations.
pub mod documents;

/// Classified vault errors.
pub mod error;

/// Project index rescans.
pub mod indexer;

/// Advisory file locks guarding the index stores.
pub mod lock;

/// Canonical and local path translation.
pub mod mapping;

/// Output formatting.
pub mod output;

/// Check-out / check-in.
pub mod registration;

/// Filesystem scanning of the canonical tree.
pub mod scanner;

/// Index entries and the index store.
pub mod storage;

/// Local replica reconciliation.
pub mod sync;

/// Utility functions and helpers.
pub mod utils;

/// Per-process vault handle.
pub mod vault;

/// Background watchers and the control loop.
pub mod watch;

pub use error::VaultError;

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Current version of the cadsync binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default index directory name inside the project root.
pub const INDEX_DIR_NAME: &str = ".cadsync";

/// Default configuration file path relative to home directory.
pub const DEFAULT_CONFIG_PATH: &str = ".config/cadsync/config.toml";

/// Central context for CLI operations.
///
/// Holds the loaded configuration, where it came from and the acting user.
/// Engine types never see it; commands turn it into a [`vault::Vault`].
///
/// # Examples
///
/// ```no_run
/// use cadsync::CadsyncContext;
///
/// # fn main() -> anyhow::Result<()> {
/// let ctx = CadsyncContext::new()?;
/// let vault = ctx.vault()?;
/// vault.sync_to_local()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CadsyncContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,

    /// User the operations act as.
    pub user: String,

    /// Whether to run in non-interactive mode (no prompts).
    /// Used primarily for testing to prevent stdin reads.
    pub non_interactive: bool,
}

impl CadsyncContext {
    /// Creates a context from the default configuration path.
    ///
    /// `CADSYNC_CONFIG_PATH` overrides the path.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined or if the configuration
    /// file cannot be read or created.
    pub fn new() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("CADSYNC_CONFIG_PATH") {
            PathBuf::from(path)
        } else {
            let home = dirs::home_dir().context("Could not find home directory")?;
            home.join(DEFAULT_CONFIG_PATH)
        };

        let config = config::Config::load(&config_path)?;

        let validator = config::validator::ConfigValidator::new();
        if let Err(e) = validator.validate_config_file(&config_path) {
            eprintln!("Warning: Configuration validation failed: {e}");
        }

        Ok(Self {
            config_path,
            user: utils::get_user_from_config(&config),
            config,
            non_interactive: false,
        })
    }

    /// Creates a non-interactive context from an explicit configuration file.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or created.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            user: utils::get_user_from_config(&config),
            config,
            non_interactive: true,
        })
    }

    /// Opens the vault described by the configuration.
    ///
    /// # Errors
    /// Returns an error if no project root or index directory is configured,
    /// or the index stores cannot be opened.
    pub fn vault(&self) -> Result<vault::Vault> {
        let index_dir = self.config.index_dir()?;
        let vault = vault::Vault::open(&index_dir, self.config.core.local_root.clone(), self.user.clone())
            .with_context(|| format!("Failed to open vault index in {}", index_dir.display()))?;
        Ok(vault.with_rules(scanner::ScanRules::from_config(&self.config.scan)?))
    }
}
