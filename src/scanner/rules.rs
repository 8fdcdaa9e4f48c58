use crate::config::ScanConfig;
use anyhow::{Context, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Decides which filesystem objects a scan skips.
///
/// An object is excluded when its name starts with the temp-file prefix, its
/// extension is one of the backup extensions, its name or root-relative path
/// matches an ignore pattern, or it is one of the explicitly excluded paths
/// (the index directory when it lives inside the tree).
#[derive(Debug, Clone)]
pub struct ScanRules {
    temp_prefix: String,
    backup_extensions: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    excluded_paths: Vec<PathBuf>,
    follow_symlinks: bool,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            temp_prefix: "~".to_string(),
            backup_extensions: vec!["bak".to_string()],
            ignore_patterns: Vec::new(),
            excluded_paths: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl ScanRules {
    /// Builds rules from the `[scan]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore pattern is not a valid glob.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("Invalid ignore pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            temp_prefix: config.temp_prefix.clone(),
            backup_extensions: config
                .backup_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignore_patterns,
            excluded_paths: Vec::new(),
            follow_symlinks: config.follow_symlinks,
        })
    }

    /// Never descend into or report `path`.
    #[must_use]
    pub fn exclude_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    #[must_use]
    pub const fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Whether a file name marks a temporary or backup copy.
    #[must_use]
    pub fn is_transient_name(&self, name: &str) -> bool {
        if !self.temp_prefix.is_empty() && name.starts_with(&self.temp_prefix) {
            return true;
        }
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.backup_extensions
                    .iter()
                    .any(|backup| ext.eq_ignore_ascii_case(backup))
            })
    }

    /// Whether the object at `path` (found under `root`) is skipped.
    #[must_use]
    pub fn is_excluded(&self, path: &Path, root: &Path) -> bool {
        if self.excluded_paths.iter().any(|p| p == path) {
            return true;
        }

        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if self.is_transient_name(&name) {
            return true;
        }

        if self.ignore_patterns.is_empty() {
            return false;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches(&name) || pattern.matches_path(relative))
    }
}
