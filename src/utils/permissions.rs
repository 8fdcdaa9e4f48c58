//! Read-only protection of vault objects.
//!
//! Checked-in documents are protected by clearing their write permission.
//! On unix the write bit of a directory governs creating and removing the
//! entries inside it, so directories are never made read-only there.

use crate::error::VaultError;
use anyhow::Result;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Makes `path` read-only (`true`) or writable (`false`).
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] if the object cannot be stat'ed or its
/// permissions cannot be changed.
pub fn set_readonly(path: &Path, readonly: bool) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| VaultError::filesystem(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if metadata.is_dir() && readonly {
            return Ok(());
        }

        let mode = metadata.permissions().mode();
        let new_mode = if readonly { mode & !0o222 } else { mode | 0o200 };
        if new_mode != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(new_mode))
                .map_err(|e| VaultError::filesystem(path, e))?;
        }
    }

    #[cfg(not(unix))]
    {
        let mut permissions = metadata.permissions();
        if permissions.readonly() != readonly {
            permissions.set_readonly(readonly);
            fs::set_permissions(path, permissions).map_err(|e| VaultError::filesystem(path, e))?;
        }
    }

    Ok(())
}

/// Whether `path` is currently write-protected.
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] if the object cannot be stat'ed.
pub fn is_readonly(path: &Path) -> Result<bool> {
    let metadata = fs::metadata(path).map_err(|e| VaultError::filesystem(path, e))?;
    Ok(metadata.permissions().readonly())
}

/// Makes `path` and everything below it writable so it can be removed.
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] for the first object that cannot be
/// made writable.
pub fn clear_readonly_tree(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(path).to_path_buf();
            VaultError::filesystem(&at, e.into())
        })?;
        if entry.file_type().is_symlink() {
            continue;
        }
        set_readonly(entry.path(), false)?;
    }
    Ok(())
}
