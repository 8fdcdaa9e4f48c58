//! Document-level operations used by the tree view: open, create, delete,
//! new folders and the status listing.

use crate::cad::{CadSession, DocumentKind};
use crate::error::VaultError;
use crate::storage::{Entry, EntryKind, IndexData, Status, modified_time_of};
use crate::utils::files::{copy_preserving_mtime, remove_path};
use crate::utils::paths::to_slash;
use crate::utils::permissions::set_readonly;
use crate::vault::{Vault, common_root_of};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// A document handed to the CAD session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDocument {
    pub path: PathBuf,
    pub read_only: bool,
}

pub struct Documents<'a> {
    vault: &'a Vault,
}

impl<'a> Documents<'a> {
    #[must_use]
    pub const fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    /// All project entries in path order.
    ///
    /// # Errors
    ///
    /// Returns an error if the project index cannot be read.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        self.vault.project().list(None)
    }

    /// Opens the local copy of `name`, editable only when the current user
    /// holds it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for an unknown name,
    /// [`VaultError::LocalFileMissing`] if the replica has no copy, or the
    /// session's error.
    pub fn open_document(&self, name: &str, cad: &mut dyn CadSession) -> Result<OpenedDocument> {
        let data = self.vault.project().read()?;
        let entry = file_by_name(&data, name)?;
        let path = self.vault.local_path(&entry.path, &common_root_of(&data))?;
        if !path.is_file() {
            return Err(VaultError::LocalFileMissing(path).into());
        }

        let read_only = !entry.status.is_checked_out_by(self.vault.user());
        cad.open(&path, read_only)
            .with_context(|| format!("CAD session could not open {}", path.display()))?;
        Ok(OpenedDocument { path, read_only })
    }

    /// Authors a new part or assembly in the canonical directory `dir_name`.
    ///
    /// The new document is recorded as checked out by its creator and
    /// copied, writable, into the creator's replica.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir_name` is not a known directory, a document
    /// with that designation already exists, or the session fails.
    pub fn create_document(
        &self,
        kind: DocumentKind,
        dir_name: &str,
        designation: &str,
        title: &str,
        cad: &mut dyn CadSession,
    ) -> Result<Entry> {
        if kind == DocumentKind::Drawing {
            bail!("Drawings are derived from a part or assembly; use create_drawing");
        }
        validate_name(designation)?;

        let dir = self.directory(dir_name)?;
        let target = dir.join(kind.file_name(designation));
        if target.exists() {
            bail!("{} already exists", target.display());
        }

        let created = cad
            .create_document(kind, &dir, designation, title)
            .with_context(|| format!("CAD session could not create {kind} {designation}"))?;
        tracing::info!(path = %created.display(), %kind, "document created");
        self.record_new(&created)
    }

    /// Derives a drawing from the part or assembly `source_name` and records
    /// it like [`Self::create_document`].
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unknown or not a part/assembly, the
    /// drawing already exists, or the session fails.
    pub fn create_drawing(&self, source_name: &str, cad: &mut dyn CadSession) -> Result<Entry> {
        let source = file_by_name(&self.vault.project().read()?, source_name)?;
        let source_path = PathBuf::from(&source.path);
        match DocumentKind::from_path(&source_path) {
            Some(DocumentKind::Part | DocumentKind::Assembly) => {}
            _ => bail!("'{source_name}' is not a part or assembly"),
        }

        let target = source_path.with_extension(DocumentKind::Drawing.extension());
        if target.exists() {
            bail!("{} already exists", target.display());
        }

        let created = cad
            .create_drawing(&source_path)
            .with_context(|| format!("CAD session could not derive a drawing from {source_name}"))?;
        tracing::info!(path = %created.display(), "drawing created");
        self.record_new(&created)
    }

    /// Deletes a document held by the current user from the canonical tree,
    /// the replica and both indexes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Conflict`] or [`VaultError::NotCheckedOut`] when
    /// the user does not hold it. A filesystem failure leaves both indexes
    /// untouched.
    pub fn delete_document(&self, name: &str) -> Result<Entry> {
        let user = self.vault.user();

        let (entry, local_path) = self.vault.project().transaction(|data| {
            let entry = file_by_name(data, name)?;
            match entry.status.holder() {
                Some(holder) if holder == user => {}
                Some(holder) => {
                    return Err(VaultError::Conflict {
                        name: name.to_string(),
                        holder: holder.to_string(),
                    }
                    .into());
                }
                None => {
                    return Err(VaultError::NotCheckedOut {
                        name: name.to_string(),
                        status: entry.status.clone(),
                    }
                    .into());
                }
            }

            let local_path = self.vault.local_path(&entry.path, &common_root_of(data))?;
            remove_path(&local_path)?;
            remove_path(Path::new(&entry.path))?;

            data.remove(&entry.path);
            data.last_editor = Some(user.to_string());
            Ok((entry, local_path))
        })?;

        let key = local_path.to_string_lossy().into_owned();
        self.vault.local().delete(&key)?;
        tracing::info!(path = %entry.path, "document deleted");
        Ok(entry)
    }

    /// Creates the folder `name` inside the known directory `parent_dir_name`
    /// on the canonical side and in the replica.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is unknown, the name is not a single
    /// path segment, or the folder already exists.
    pub fn create_folder(&self, parent_dir_name: &str, name: &str) -> Result<Entry> {
        validate_name(name)?;
        let parent = self.directory(parent_dir_name)?;
        let canonical = parent.join(name);

        std::fs::create_dir(&canonical).map_err(|e| VaultError::filesystem(&canonical, e))?;
        let modified = modified_time_of(&canonical)?;
        let entry = Entry::new(
            to_slash(&canonical),
            EntryKind::Directory,
            Status::Registered,
            modified,
        );

        let root = self.vault.project().transaction(|data| {
            data.upsert(entry.clone());
            data.last_editor = Some(self.vault.user().to_string());
            Ok(common_root_of(data))
        })?;

        let local_path = self.vault.local_path(&entry.path, &root)?;
        std::fs::create_dir_all(&local_path).map_err(|e| VaultError::filesystem(&local_path, e))?;
        let key = local_path.to_string_lossy().into_owned();
        self.vault.local().upsert(Entry::new(
            key,
            EntryKind::Directory,
            Status::Registered,
            modified,
        ))?;

        tracing::info!(path = %entry.path, "folder created");
        Ok(entry)
    }

    fn directory(&self, name: &str) -> Result<PathBuf> {
        let data = self.vault.project().read()?;
        Ok(PathBuf::from(&data.find(name, Some(EntryKind::Directory))?.path))
    }

    /// Records a freshly authored canonical file as checked out by the
    /// creator and places a writable copy in the replica.
    fn record_new(&self, created: &Path) -> Result<Entry> {
        let user = self.vault.user();
        let modified = modified_time_of(created)?;
        let entry = Entry::new(
            to_slash(created),
            EntryKind::File,
            Status::CheckedOut(user.to_string()),
            modified,
        );

        let root = self.vault.project().transaction(|data| {
            data.upsert(entry.clone());
            data.last_editor = Some(user.to_string());
            Ok(common_root_of(data))
        })?;

        let local_path = self.vault.local_path(&entry.path, &root)?;
        copy_preserving_mtime(created, &local_path)?;
        set_readonly(created, true)?;

        let key = local_path.to_string_lossy().into_owned();
        self.vault.local().upsert(Entry::new(
            key,
            EntryKind::File,
            entry.status.clone(),
            modified,
        ))?;
        Ok(entry)
    }
}

fn file_by_name(data: &IndexData, name: &str) -> Result<Entry> {
    Ok(data.find(name, Some(EntryKind::File))?.clone())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("'{name}' is not a valid name");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cad::DetachedSession;
    use crate::error::classify;
    use crate::utils::permissions::is_readonly;
    use std::fs;
    use tempfile::TempDir;

    /// Writes placeholder files where a CAD application would author them.
    #[derive(Default)]
    struct FakeCad {
        opened: Vec<(PathBuf, bool)>,
    }

    impl CadSession for FakeCad {
        fn open(&mut self, path: &Path, read_only: bool) -> Result<()> {
            self.opened.push((path.to_path_buf(), read_only));
            Ok(())
        }
        fn close_active(&mut self) -> Result<()> {
            Ok(())
        }
        fn active_document_name(&mut self) -> Result<Option<String>> {
            Ok(None)
        }
        fn set_read_only(&mut self, _: &Path, _: bool) -> Result<()> {
            Ok(())
        }
        fn create_document(&mut self, kind: DocumentKind, dir: &Path, designation: &str, title: &str) -> Result<PathBuf> {
            let path = dir.join(kind.file_name(designation));
            fs::write(&path, title)?;
            Ok(path)
        }
        fn create_drawing(&mut self, source: &Path) -> Result<PathBuf> {
            let path = source.with_extension("cdw");
            fs::write(&path, b"sheet")?;
            Ok(path)
        }
    }

    struct Fixture {
        temp: TempDir,
        root: PathBuf,
        vault: Vault,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("net/CAD");
        fs::create_dir_all(root.join("A")).unwrap();
        fs::write(root.join("A/part.m3d"), b"v1").unwrap();
        let vault = Vault::open(&temp.path().join("idx"), temp.path().join("alice"), "alice").unwrap();
        vault.reindex(&root).unwrap();
        vault.sync_to_local().unwrap();
        Fixture { temp, root, vault }
    }

    #[test]
    fn test_open_read_only_unless_held() -> Result<()> {
        let fx = fixture();
        let docs = fx.vault.documents();
        let mut cad = FakeCad::default();

        let opened = docs.open_document("part.m3d", &mut cad)?;
        assert!(opened.read_only);
        assert_eq!(opened.path, fx.temp.path().join("alice/A/part.m3d"));

        fx.vault.unregister("part.m3d", &mut DetachedSession)?;
        assert!(!docs.open_document("part.m3d", &mut cad)?.read_only);
        assert_eq!(cad.opened.len(), 2);
        Ok(())
    }

    #[test]
    fn test_create_document_is_checked_out_to_creator() -> Result<()> {
        let fx = fixture();
        let mut cad = FakeCad::default();
        let entry = fx
            .vault
            .documents()
            .create_document(DocumentKind::Assembly, "A", "SB-100", "Frame", &mut cad)?;

        assert_eq!(entry.name, "SB-100.a3d");
        assert_eq!(entry.status, Status::CheckedOut("alice".into()));
        assert!(is_readonly(&fx.root.join("A/SB-100.a3d"))?);

        let local = fx.temp.path().join("alice/A/SB-100.a3d");
        assert_eq!(fs::read_to_string(&local)?, "Frame");
        assert!(!is_readonly(&local)?);

        let err = fx
            .vault
            .documents()
            .create_document(DocumentKind::Assembly, "A", "SB-100", "Again", &mut cad)
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        Ok(())
    }

    #[test]
    fn test_create_drawing_beside_source() -> Result<()> {
        let fx = fixture();
        let entry = fx
            .vault
            .documents()
            .create_drawing("part.m3d", &mut FakeCad::default())?;
        assert_eq!(entry.name, "part.cdw");
        assert!(fx.temp.path().join("alice/A/part.cdw").exists());

        assert!(
            fx.vault
                .documents()
                .create_drawing("part.cdw", &mut FakeCad::default())
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn test_create_in_unknown_directory() {
        let fx = fixture();
        let err = fx
            .vault
            .documents()
            .create_document(DocumentKind::Part, "Z", "P-1", "Plate", &mut FakeCad::default())
            .unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::NotFound(_))));
    }

    #[test]
    fn test_delete_requires_checkout() -> Result<()> {
        let fx = fixture();
        let docs = fx.vault.documents();

        let err = docs.delete_document("part.m3d").unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::NotCheckedOut { .. })));
        assert!(fx.root.join("A/part.m3d").exists());

        fx.vault.unregister("part.m3d", &mut DetachedSession)?;
        docs.delete_document("part.m3d")?;
        assert!(!fx.root.join("A/part.m3d").exists());
        assert!(!fx.temp.path().join("alice/A/part.m3d").exists());
        assert!(matches!(
            classify(&fx.vault.project().get_by_name("part.m3d").unwrap_err()),
            Some(VaultError::NotFound(_))
        ));
        assert_eq!(fx.vault.local().list(Some(EntryKind::File))?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_create_folder() -> Result<()> {
        let fx = fixture();
        let docs = fx.vault.documents();
        let entry = docs.create_folder("A", "Sub")?;

        assert_eq!(entry.kind, EntryKind::Directory);
        assert!(fx.root.join("A/Sub").is_dir());
        assert!(fx.temp.path().join("alice/A/Sub").is_dir());
        assert!(docs.create_folder("A", "Sub").is_err());
        assert!(docs.create_folder("A", "x/y").is_err());

        // A later sync sees nothing to do for it
        let report = fx.vault.sync_to_local()?;
        assert!(report.is_clean());
        Ok(())
    }
}
