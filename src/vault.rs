//! Handles one user process needs to act on the vault.

use crate::cad::CadSession;
use crate::documents::Documents;
use crate::indexer::{ProjectIndexer, ReindexReport};
use crate::mapping;
use crate::registration::Registrar;
use crate::scanner::{ScanRules, TreeScanner};
use crate::storage::index::IndexStore;
use crate::storage::{Entry, IndexData};
use crate::sync::{LocalSync, SyncReport};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// File name of the shared project index inside the index directory.
pub const PROJECT_INDEX_FILE: &str = "project.idx";

/// File name of a user's index inside the index directory.
#[must_use]
pub fn user_index_file(user: &str) -> String {
    let safe: String = user
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    format!("project_{safe}.idx")
}

/// Project and user index stores, the local replica root and the acting
/// user.
///
/// A `Vault` holds paths only; it is meant to be built for an operation and
/// dropped afterwards.
#[derive(Debug, Clone)]
pub struct Vault {
    project: IndexStore,
    local: IndexStore,
    local_root: PathBuf,
    user: String,
    scanner: TreeScanner,
}

impl Vault {
    /// Opens (creating if needed) both index stores in `index_dir`.
    ///
    /// The index directory and the local root are never scanned.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be created or read.
    pub fn open(index_dir: &Path, local_root: impl Into<PathBuf>, user: impl Into<String>) -> Result<Self> {
        let user = user.into();
        let local_root = local_root.into();
        let project = IndexStore::open(index_dir.join(PROJECT_INDEX_FILE))?;
        let local = IndexStore::open(index_dir.join(user_index_file(&user)))?;
        let scanner = TreeScanner::new(
            ScanRules::default()
                .exclude_path(index_dir)
                .exclude_path(&local_root),
        );

        Ok(Self {
            project,
            local,
            local_root,
            user,
            scanner,
        })
    }

    /// Replaces the scan rules; the index directory and local root stay
    /// excluded.
    #[must_use]
    pub fn with_rules(mut self, rules: ScanRules) -> Self {
        let index_dir = self
            .project
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.scanner = TreeScanner::new(
            rules
                .exclude_path(index_dir)
                .exclude_path(&self.local_root),
        );
        self
    }

    #[must_use]
    pub const fn project(&self) -> &IndexStore {
        &self.project
    }

    #[must_use]
    pub const fn local(&self) -> &IndexStore {
        &self.local
    }

    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub const fn scanner(&self) -> &TreeScanner {
        &self.scanner
    }

    /// Common root of the project index as it is on disk now.
    ///
    /// # Errors
    ///
    /// Returns an error if the project index cannot be read.
    pub fn common_root(&self) -> Result<String> {
        Ok(common_root_of(&self.project.read()?))
    }

    /// Local replica path of a canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Mapping`] if the path is outside `root`.
    pub fn local_path(&self, canonical: &str, root: &str) -> Result<PathBuf> {
        mapping::to_local(canonical, root, &self.local_root)
    }

    #[must_use]
    pub fn indexer(&self) -> ProjectIndexer<'_> {
        ProjectIndexer::new(&self.project, &self.scanner, self.user.as_str())
    }

    #[must_use]
    pub fn sync(&self) -> LocalSync<'_> {
        LocalSync::new(self)
    }

    #[must_use]
    pub fn registrar(&self) -> Registrar<'_> {
        Registrar::new(self)
    }

    #[must_use]
    pub fn documents(&self) -> Documents<'_> {
        Documents::new(self)
    }

    /// Rescans the canonical tree under `root` into the project index.
    ///
    /// # Errors
    ///
    /// See [`ProjectIndexer::reindex`].
    pub fn reindex(&self, root: &Path) -> Result<ReindexReport> {
        self.indexer().reindex(root)
    }

    /// Mirrors the project index into this user's local replica.
    ///
    /// # Errors
    ///
    /// See [`LocalSync::sync_to_local`].
    pub fn sync_to_local(&self) -> Result<SyncReport> {
        self.sync().sync_to_local()
    }

    /// Checks a document out to this user.
    ///
    /// # Errors
    ///
    /// See [`Registrar::unregister`].
    pub fn unregister(&self, name: &str, cad: &mut dyn CadSession) -> Result<Entry> {
        self.registrar().unregister(name, cad)
    }

    /// Checks a document held by this user back in.
    ///
    /// # Errors
    ///
    /// See [`Registrar::register`].
    pub fn register(&self, name: &str, cad: &mut dyn CadSession) -> Result<Entry> {
        self.registrar().register(name, cad)
    }
}

/// Common root of the entries in a project index snapshot.
#[must_use]
pub fn common_root_of(data: &IndexData) -> String {
    mapping::project_root(data.entries.keys().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_user_index_file_is_filesystem_safe() {
        assert_eq!(user_index_file("alice"), "project_alice.idx");
        assert_eq!(user_index_file(r"CORP\bob"), "project_CORP_bob.idx");
        assert_eq!(user_index_file("a/b"), "project_a_b.idx");
    }

    #[test]
    fn test_open_creates_both_stores() -> Result<()> {
        let temp = TempDir::new()?;
        let vault = Vault::open(&temp.path().join("idx"), temp.path().join("local"), "alice")?;

        assert!(temp.path().join("idx/project.idx").exists());
        assert!(temp.path().join("idx/project_alice.idx").exists());
        assert_eq!(vault.user(), "alice");
        assert_eq!(vault.common_root()?, "");
        Ok(())
    }
}
