use super::ScanRules;
use crate::storage::{EntryKind, modified_time};
use crate::utils::paths::to_slash;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// One object found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Native path of the object
    pub path: PathBuf,
    /// `/`-separated form of `path`, used as the index key
    pub key: String,
    pub kind: EntryKind,
    /// Modification time, whole seconds
    pub modified: NaiveDateTime,
}

/// Walks canonical trees according to a set of [`ScanRules`].
#[derive(Debug, Clone, Default)]
pub struct TreeScanner {
    rules: ScanRules,
}

impl TreeScanner {
    #[must_use]
    pub const fn new(rules: ScanRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub const fn rules(&self) -> &ScanRules {
        &self.rules
    }

    /// Lazily yields every object below `root` (the root itself excluded).
    ///
    /// The walk is depth-first with siblings in name order, and a directory
    /// is always yielded before anything it contains. Excluded directories
    /// are not descended into. Objects that vanish or cannot be read while
    /// walking are logged and skipped.
    pub fn scan<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = ScannedEntry> + 'a {
        WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.rules.follow_symlinks())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.rules.is_excluded(entry.path(), root))
            .filter_map(|entry| match entry {
                Ok(entry) => scanned(&entry),
                Err(e) => {
                    let vanished = e
                        .io_error()
                        .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound);
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    if vanished {
                        tracing::debug!(path = %path.display(), "entry vanished during scan");
                    } else {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    }
                    None
                }
            })
    }
}

fn scanned(entry: &DirEntry) -> Option<ScannedEntry> {
    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!(path = %entry.path().display(), error = %e, "entry vanished before stat");
            return None;
        }
    };

    let modified = match modified_time(&metadata) {
        Ok(modified) => modified,
        Err(e) => {
            tracing::warn!(path = %entry.path().display(), error = %e, "no modification time");
            return None;
        }
    };

    Some(ScannedEntry {
        path: entry.path().to_path_buf(),
        key: to_slash(entry.path()),
        kind: EntryKind::of(&metadata),
        modified,
    })
}
