#![allow(dead_code)]

use anyhow::Result;
use cadsync::vault::Vault;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Canonical tree, index directory and per-user replicas in one temp dir.
///
/// The index directory lives inside the canonical tree the way a default
/// configuration places it.
pub struct TestVault {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestVault {
    /// Empty canonical tree.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("net/CAD");
        fs::create_dir_all(&root)?;
        Ok(Self { temp_dir, root })
    }

    /// Tree with two top-level directories, a nested assembly directory
    /// and one document at the top.
    pub fn with_sample_tree() -> Result<Self> {
        let fixture = Self::new()?;
        fixture.write("A/part.m3d", b"part")?;
        fixture.write("A/B/asm.a3d", b"asm")?;
        fixture.write("C/sheet.cdw", b"sheet")?;
        fixture.write("top.m3d", b"top")?;
        Ok(fixture)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(cadsync::INDEX_DIR_NAME)
    }

    pub fn local_root(&self, user: &str) -> PathBuf {
        self.temp_dir.path().join(user).join("Vault")
    }

    /// Vault handle acting as `user`.
    pub fn vault(&self, user: &str) -> Result<Vault> {
        Vault::open(&self.index_dir(), self.local_root(user), user)
    }

    pub fn canonical(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn local(&self, user: &str, rel: &str) -> PathBuf {
        self.local_root(user).join(rel)
    }

    /// Writes a canonical file, clearing a read-only flag left by a reindex.
    pub fn write(&self, rel: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.canonical(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            cadsync::utils::permissions::set_readonly(&path, false)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Pins a canonical object's modification time.
    pub fn touch(&self, rel: &str, unix_secs: i64) -> Result<()> {
        filetime::set_file_mtime(self.canonical(rel), FileTime::from_unix_time(unix_secs, 0))?;
        Ok(())
    }
}

/// Slash-separated path key as stored in the project index.
pub fn key(path: &Path) -> String {
    cadsync::utils::paths::to_slash(path)
}
