use super::{Entry, EntryKind, IndexData};
use crate::error::VaultError;
use crate::lock::{LockMode, StoreLock};
use crate::utils::serialization;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Handle to one index file on disk.
///
/// The handle holds no open file or cached state; every call re-reads the
/// file under a lock, so several processes can share one store.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    /// Opens the store at `path`, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or holds something
    /// other than an index.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.create_schema()?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock> {
        StoreLock::acquire(&self.lock_path(), mode)
            .map_err(|e| VaultError::Storage(format!("{e:#}")).into())
    }

    /// Writes an empty index if the file does not exist yet. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or the file cannot be created.
    pub fn create_schema(&self) -> Result<()> {
        let _lock = self.lock(LockMode::Exclusive)?;
        if self.path.exists() {
            return Ok(());
        }
        tracing::debug!(path = %self.path.display(), "creating index store");
        self.persist(&IndexData::new())
    }

    fn load(&self) -> Result<IndexData> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexData::new()),
            Err(e) => {
                return Err(VaultError::Storage(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                ))
                .into());
            }
        };

        let data: IndexData = serialization::decode_index(&bytes).map_err(|e| {
            VaultError::Storage(format!("{} is corrupt: {e}", self.path.display()))
        })?;

        if data.version != IndexData::VERSION {
            return Err(VaultError::Storage(format!(
                "{} has unsupported version {} (expected {})",
                self.path.display(),
                data.version,
                IndexData::VERSION
            ))
            .into());
        }

        Ok(data)
    }

    /// Atomically replaces the store file with `data`.
    fn persist(&self, data: &IndexData) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let bytes = serialization::encode_index(data).context("Failed to serialize index")?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        temp.write_all(&bytes)
            .context("Failed to write index to temp file")?;
        temp.as_file()
            .sync_all()
            .context("Failed to flush index temp file")?;
        temp.persist(&self.path).map_err(|e| {
            VaultError::Storage(format!("cannot replace {}: {}", self.path.display(), e.error))
        })?;
        Ok(())
    }

    /// Snapshot of the whole store taken under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`] if the file cannot be read or decoded.
    pub fn read(&self) -> Result<IndexData> {
        let _lock = self.lock(LockMode::Shared)?;
        self.load()
    }

    /// Runs `f` against the current contents under an exclusive lock.
    ///
    /// Changes are written back only when `f` succeeds and actually modified
    /// the data, so a failed or no-op transaction leaves the file (and its
    /// mtime) untouched.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a storage error if the store cannot be
    /// locked, read or written.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut IndexData) -> Result<T>) -> Result<T> {
        let _lock = self.lock(LockMode::Exclusive)?;
        let original = self.load()?;
        let mut data = original.clone();

        let value = f(&mut data)?;

        if data != original {
            self.persist(&data)?;
            tracing::trace!(path = %self.path.display(), entries = data.len(), "index committed");
        }
        Ok(value)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub fn upsert(&self, entry: Entry) -> Result<()> {
        self.transaction(|data| {
            data.upsert(entry);
            Ok(())
        })
    }

    /// Removes the entry stored under `path`; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub fn delete(&self, path: &str) -> Result<bool> {
        self.transaction(|data| Ok(data.remove(path).is_some()))
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if no entry has this name, or
    /// [`VaultError::Ambiguous`] if several do.
    pub fn get_by_name(&self, name: &str) -> Result<Entry> {
        Ok(self.read()?.get_by_name(name)?.clone())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, path: &str) -> Result<Option<Entry>> {
        Ok(self.read()?.get(path).cloned())
    }

    /// Entries in path order, optionally restricted to one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self, kind: Option<EntryKind>) -> Result<Vec<Entry>> {
        Ok(self.read()?.list(kind).cloned().collect())
    }

    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if `path` is not indexed.
    pub fn get_last_modified(&self, path: &str) -> Result<NaiveDateTime> {
        self.read()?
            .last_modified(path)
            .ok_or_else(|| VaultError::NotFound(path.to_string()).into())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn last_editor(&self) -> Result<Option<String>> {
        Ok(self.read()?.last_editor)
    }

    /// Overwrites the last-editor record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub fn set_last_editor(&self, user: &str) -> Result<()> {
        self.transaction(|data| {
            data.last_editor = Some(user.to_string());
            Ok(())
        })
    }

    /// Modification time of the store file, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be stat'ed.
    pub fn modified_time(&self) -> Result<Option<SystemTime>> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(Some(metadata.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::filesystem(&self.path, e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::storage::Status;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(10, 0, s)
            .unwrap()
    }

    fn file(path: &str, s: u32) -> Entry {
        Entry::new(path, EntryKind::File, Status::Registered, ts(s))
    }

    #[test]
    fn test_open_creates_empty_store() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("idx/project.idx"))?;

        assert!(store.path().exists());
        assert!(store.list(None)?.is_empty());
        assert_eq!(store.last_editor()?, None);

        // Idempotent
        store.upsert(file("/root/a.m3d", 1))?;
        store.create_schema()?;
        assert_eq!(store.list(None)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_crud() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("project.idx"))?;

        store.upsert(file("/root/A/part.m3d", 1))?;
        store.upsert(Entry::new(
            "/root/A",
            EntryKind::Directory,
            Status::Registered,
            ts(0),
        ))?;

        assert_eq!(store.get_by_name("part.m3d")?.path, "/root/A/part.m3d");
        assert_eq!(store.get_last_modified("/root/A/part.m3d")?, ts(1));
        assert_eq!(store.list(Some(EntryKind::Directory))?.len(), 1);

        store.upsert(file("/root/A/part.m3d", 7))?;
        assert_eq!(store.get_last_modified("/root/A/part.m3d")?, ts(7));
        assert_eq!(store.list(None)?.len(), 2);

        assert!(store.delete("/root/A/part.m3d")?);
        assert!(!store.delete("/root/A/part.m3d")?);
        assert!(store.get("/root/A/part.m3d")?.is_none());
        Ok(())
    }

    #[test]
    fn test_not_found_is_classified() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("project.idx"))?;

        let err = store.get_by_name("missing.m3d").unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::NotFound(_))));

        let err = store.get_last_modified("/root/missing.m3d").unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_failed_transaction_is_not_applied() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("project.idx"))?;
        store.upsert(file("/root/keep.m3d", 1))?;

        let result: Result<()> = store.transaction(|data| {
            data.upsert(file("/root/half.m3d", 2));
            data.remove("/root/keep.m3d");
            anyhow::bail!("abort")
        });

        assert!(result.is_err());
        let entries = store.list(None)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/root/keep.m3d");
        Ok(())
    }

    #[test]
    fn test_noop_transaction_keeps_file_untouched() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("project.idx"))?;
        store.set_last_editor("alice")?;

        let past = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(store.path(), past)?;

        store.set_last_editor("alice")?;
        let after = filetime::FileTime::from_last_modification_time(&std::fs::metadata(store.path())?);
        assert_eq!(after, past);

        store.set_last_editor("bob")?;
        assert_eq!(store.last_editor()?.as_deref(), Some("bob"));
        Ok(())
    }

    #[test]
    fn test_corrupt_store_is_storage_error() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("project.idx");
        std::fs::write(&path, b"not an index")?;

        let store = IndexStore::open(&path)?;
        let err = store.list(None).unwrap_err();
        assert!(matches!(classify(&err), Some(VaultError::Storage(_))));
        Ok(())
    }

    #[test]
    fn test_modified_time() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore {
            path: temp.path().join("never.idx"),
        };
        assert!(store.modified_time()?.is_none());

        store.create_schema()?;
        assert!(store.modified_time()?.is_some());
        Ok(())
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_updates() -> Result<()> {
        let temp = TempDir::new()?;
        let store = IndexStore::open(temp.path().join("project.idx"))?;

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        store
                            .upsert(file(&format!("/root/t{t}/f{i}.m3d"), i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list(None)?.len(), 20);
        Ok(())
    }
}
