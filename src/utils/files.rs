use super::permissions::{clear_readonly_tree, set_readonly};
use crate::error::VaultError;
use anyhow::Result;
use filetime::FileTime;
use std::fs;
use std::path::Path;

/// Copies `src` over `dst` and gives `dst` the modification time of `src`.
///
/// Parent directories of `dst` are created and a read-only `dst` is made
/// writable first. The copy is left writable.
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] naming the object that failed.
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::metadata(src).map_err(|e| VaultError::filesystem(src, e))?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| VaultError::filesystem(parent, e))?;
    }
    if dst.exists() {
        set_readonly(dst, false)?;
    }

    fs::copy(src, dst).map_err(|e| VaultError::filesystem(dst, e))?;
    // fs::copy carries the permission bits over; the copy starts out writable
    set_readonly(dst, false)?;

    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(dst, mtime).map_err(|e| VaultError::filesystem(dst, e))?;
    Ok(())
}

/// Removes a file or a whole directory tree, clearing read-only first.
///
/// A path that no longer exists counts as removed.
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] if the object cannot be removed.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(VaultError::filesystem(path, e).into()),
    };

    if metadata.is_dir() {
        clear_readonly_tree(path)?;
        fs::remove_dir_all(path).map_err(|e| VaultError::filesystem(path, e))?;
    } else {
        if !metadata.file_type().is_symlink() {
            set_readonly(path, false)?;
        }
        fs::remove_file(path).map_err(|e| VaultError::filesystem(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::permissions::is_readonly;
    use tempfile::TempDir;

    #[test]
    fn test_copy_keeps_mtime_and_overwrites_readonly() -> Result<()> {
        let temp = TempDir::new()?;
        let src = temp.path().join("net/A/part.m3d");
        let dst = temp.path().join("local/A/part.m3d");
        fs::create_dir_all(src.parent().unwrap())?;
        fs::write(&src, b"v1")?;
        set_readonly(&src, true)?;
        let t1 = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&src, t1)?;

        copy_preserving_mtime(&src, &dst)?;
        assert_eq!(fs::read(&dst)?, b"v1");
        assert!(!is_readonly(&dst)?);
        assert_eq!(FileTime::from_last_modification_time(&fs::metadata(&dst)?), t1);

        set_readonly(&dst, true)?;
        set_readonly(&src, false)?;
        fs::write(&src, b"v2")?;
        copy_preserving_mtime(&src, &dst)?;
        assert_eq!(fs::read(&dst)?, b"v2");
        Ok(())
    }

    #[test]
    fn test_remove_path() -> Result<()> {
        let temp = TempDir::new()?;
        let dir = temp.path().join("A");
        fs::create_dir_all(dir.join("B"))?;
        fs::write(dir.join("B/part.m3d"), b"x")?;
        set_readonly(&dir.join("B/part.m3d"), true)?;

        remove_path(&dir)?;
        assert!(!dir.exists());

        // Already gone
        remove_path(&dir)?;

        let file = temp.path().join("lone.cdw");
        fs::write(&file, b"y")?;
        set_readonly(&file, true)?;
        remove_path(&file)?;
        assert!(!file.exists());
        Ok(())
    }
}
