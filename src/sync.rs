//! Mirrors the project index into one user's local replica.

use crate::error::VaultError;
use crate::storage::{Entry, EntryKind, IndexData, Status};
use crate::utils::files::{copy_preserving_mtime, remove_path};
use crate::utils::permissions::set_readonly;
use crate::vault::{Vault, common_root_of};
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A replica object that could not be brought in line.
#[derive(Debug)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// Outcome of one [`LocalSync::sync_to_local`] run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Objects created in the replica
    pub created: usize,
    /// Objects refreshed from the canonical tree
    pub updated: usize,
    /// Objects deleted from the replica
    pub removed: usize,
    /// Files left alone because this user has them checked out
    pub kept_checked_out: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub const fn changed(&self) -> bool {
        self.created + self.updated + self.removed > 0
    }

    fn fail(&mut self, path: &Path, error: anyhow::Error) {
        tracing::warn!(path = %path.display(), error = %error, "sync failed for entry");
        self.failures.push(SyncFailure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Reconciles the local replica and user index against the project index.
pub struct LocalSync<'a> {
    vault: &'a Vault,
}

impl<'a> LocalSync<'a> {
    #[must_use]
    pub const fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    /// Brings the local replica in line with the project index.
    ///
    /// Directories are created first, then files are copied (keeping the
    /// canonical modification time) and write-protected, then replica
    /// objects whose canonical entry is gone are deleted. Files checked out
    /// by this user are never overwritten. A failure on one object is
    /// recorded in the report and the run goes on with the next one.
    ///
    /// # Errors
    ///
    /// Returns an error only if one of the index stores cannot be read or
    /// written.
    pub fn sync_to_local(&self) -> Result<SyncReport> {
        let span = tracing::info_span!("sync_to_local", user = %self.vault.user());
        let _guard = span.enter();

        let canonical = self.vault.project().read()?;
        let root = common_root_of(&canonical);
        tracing::debug!(common_root = %root, entries = canonical.len(), "syncing");

        let report = self.vault.local().transaction(|local| {
            let mut report = SyncReport::default();
            let mut synced = HashSet::new();

            self.sync_directories(&canonical, &root, local, &mut synced, &mut report);
            self.sync_files(&canonical, &root, local, &mut synced, &mut report);
            Self::remove_orphans(local, &synced, &mut report);

            Ok(report)
        })?;

        tracing::info!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            failures = report.failures.len(),
            "local replica synced"
        );
        Ok(report)
    }

    fn map(&self, entry: &Entry, root: &str, report: &mut SyncReport) -> Option<(PathBuf, String)> {
        match self.vault.local_path(&entry.path, root) {
            Ok(path) => {
                let key = path.to_string_lossy().into_owned();
                Some((path, key))
            }
            Err(error) => {
                report.fail(Path::new(&entry.path), error);
                None
            }
        }
    }

    fn sync_directories(
        &self,
        canonical: &IndexData,
        root: &str,
        local: &mut IndexData,
        synced: &mut HashSet<String>,
        report: &mut SyncReport,
    ) {
        for entry in canonical.list(Some(EntryKind::Directory)) {
            let Some((path, key)) = self.map(entry, root, report) else {
                continue;
            };

            if !path.is_dir()
                && let Err(e) = std::fs::create_dir_all(&path)
            {
                report.fail(&path, VaultError::filesystem(&path, e).into());
                continue;
            }
            synced.insert(key.clone());

            match local.get_mut(&key) {
                None => {
                    local.upsert(Entry::new(
                        key,
                        EntryKind::Directory,
                        Status::Registered,
                        entry.last_modified,
                    ));
                    report.created += 1;
                }
                Some(existing) if existing.last_modified != entry.last_modified => {
                    existing.last_modified = entry.last_modified;
                    existing.status = Status::Stale;
                    report.updated += 1;
                }
                Some(_) => {}
            }
        }
    }

    fn sync_files(
        &self,
        canonical: &IndexData,
        root: &str,
        local: &mut IndexData,
        synced: &mut HashSet<String>,
        report: &mut SyncReport,
    ) {
        let user = self.vault.user();

        for entry in canonical.list(Some(EntryKind::File)) {
            let Some((path, key)) = self.map(entry, root, report) else {
                continue;
            };
            let mine = entry.status.is_checked_out_by(user);
            let source = Path::new(&entry.path);

            let stored = local.get(&key).map(|e| e.last_modified);
            let present = path.is_file();
            if stored.is_some() {
                // A failed refresh must not turn the existing copy into an orphan
                synced.insert(key.clone());
            }

            let action = match stored {
                None if mine && present => {
                    // Held copy without a user index entry: adopt it as is
                    local.upsert(Entry::new(
                        key.clone(),
                        EntryKind::File,
                        entry.status.clone(),
                        entry.last_modified,
                    ));
                    report.kept_checked_out += 1;
                    None
                }
                None => Some(Status::Registered),
                Some(_) if mine && present => {
                    report.kept_checked_out += 1;
                    None
                }
                Some(ts) if ts != entry.last_modified => Some(Status::Stale),
                Some(_) if !present => Some(Status::Stale),
                Some(_) => None,
            };

            if let Some(new_status) = action {
                let new_status = if mine {
                    entry.status.clone()
                } else {
                    new_status
                };

                if let Err(error) = copy_preserving_mtime(source, &path) {
                    report.fail(&path, error);
                    continue;
                }
                if !mine
                    && let Err(error) = set_readonly(&path, true)
                {
                    report.fail(&path, error);
                    continue;
                }

                if stored.is_some() {
                    report.updated += 1;
                } else {
                    report.created += 1;
                }
                local.upsert(Entry::new(
                    key.clone(),
                    EntryKind::File,
                    new_status,
                    entry.last_modified,
                ));
            }

            synced.insert(key);
        }
    }

    fn remove_orphans(local: &mut IndexData, synced: &HashSet<String>, report: &mut SyncReport) {
        let orphans: Vec<String> = local
            .entries
            .keys()
            .filter(|key| !synced.contains(*key))
            .cloned()
            .collect();

        for key in orphans {
            let path = PathBuf::from(&key);
            match remove_path(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "removed from replica");
                    local.remove(&key);
                    report.removed += 1;
                }
                Err(error) => report.fail(&path, error),
            }
        }
    }
}
