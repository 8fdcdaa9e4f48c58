//! Reconciles a scan of the canonical tree against the project index.

use crate::error::VaultError;
use crate::scanner::TreeScanner;
use crate::storage::index::IndexStore;
use crate::storage::{Entry, Status};
use crate::utils::permissions::set_readonly;
use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// A scanned object that could not be write-protected.
#[derive(Debug)]
pub struct ProtectFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// Outcome of one [`ProjectIndexer::reindex`] run.
#[derive(Debug, Default)]
pub struct ReindexReport {
    /// Entries inserted for newly seen objects
    pub added: usize,
    /// Entries whose modification time changed
    pub updated: usize,
    /// Entries dropped because their object is gone
    pub removed: usize,
    /// Objects seen by the scan
    pub scanned: usize,
    pub protect_failures: Vec<ProtectFailure>,
}

impl ReindexReport {
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

/// Keeps the project index equal to what is on disk under the project root.
pub struct ProjectIndexer<'a> {
    store: &'a IndexStore,
    scanner: &'a TreeScanner,
    user: &'a str,
}

impl<'a> ProjectIndexer<'a> {
    #[must_use]
    pub const fn new(store: &'a IndexStore, scanner: &'a TreeScanner, user: &'a str) -> Self {
        Self {
            store,
            scanner,
            user,
        }
    }

    /// Rescans `root` and brings the project index in line with it.
    ///
    /// New objects are recorded as registered, changed modification times
    /// are updated in place and entries for vanished objects are deleted.
    /// Every scanned object is made read-only. The last-editor record is set
    /// to the acting user in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Filesystem`] if `root` is not a directory, or a
    /// storage error if the index cannot be updated. Failures to protect
    /// single objects are collected in the report instead.
    pub fn reindex(&self, root: &Path) -> Result<ReindexReport> {
        let span = tracing::info_span!("reindex", root = %root.display());
        let _guard = span.enter();

        if !root.is_dir() {
            return Err(VaultError::filesystem(
                root,
                io::Error::new(io::ErrorKind::NotFound, "project root is not a directory"),
            )
            .into());
        }

        self.store.create_schema()?;

        let report = self.store.transaction(|data| {
            let mut report = ReindexReport::default();
            let mut remaining: HashMap<String, NaiveDateTime> = data
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.last_modified))
                .collect();

            for scanned in self.scanner.scan(root) {
                report.scanned += 1;

                match remaining.remove(&scanned.key) {
                    None => {
                        tracing::debug!(path = %scanned.key, kind = %scanned.kind, "new entry");
                        data.upsert(Entry::new(
                            scanned.key.clone(),
                            scanned.kind,
                            Status::Registered,
                            scanned.modified,
                        ));
                        report.added += 1;
                    }
                    Some(stored) if stored != scanned.modified => {
                        if let Some(entry) = data.get_mut(&scanned.key) {
                            tracing::debug!(path = %scanned.key, "modification time changed");
                            entry.last_modified = scanned.modified;
                            entry.kind = scanned.kind;
                            report.updated += 1;
                        }
                    }
                    Some(_) => {}
                }

                if let Err(error) = set_readonly(&scanned.path, true) {
                    tracing::warn!(path = %scanned.path.display(), error = %error, "cannot write-protect");
                    report.protect_failures.push(ProtectFailure {
                        path: scanned.path,
                        error,
                    });
                }
            }

            for path in remaining.keys() {
                tracing::debug!(path = %path, "entry vanished from disk");
                data.remove(path);
                report.removed += 1;
            }

            data.last_editor = Some(self.user.to_string());
            Ok(report)
        })?;

        tracing::info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            "project index updated"
        );
        Ok(report)
    }
}
