//! Advisory locking for index stores shared between user processes.
//!
//! Every index store has a sidecar `<store>.lock` file. Writers hold an
//! exclusive lock on it for the whole read-modify-write cycle, readers hold a
//! shared one. The lock file itself is never removed: another process may be
//! blocked on it.

use anyhow::{Context, Result, bail};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock flavour requested from the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers at once
    Shared,
    /// Single writer
    Exclusive,
}

impl LockMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }
}

/// Holds a lock on a store's sidecar file until dropped.
#[derive(Debug)]
pub struct StoreLock {
    /// Lock file handle
    lock_file: File,
    /// Path to the lock file (for error messages)
    lock_path: PathBuf,
    /// Mode the lock was taken in
    mode: LockMode,
}

impl StoreLock {
    /// Acquire a lock on `lock_path`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The lock file cannot be created
    /// - The lock is still held by another process after the timeout
    pub fn acquire(lock_path: &Path, mode: LockMode) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Shorter timeouts in test mode so contention tests fail fast
        let lock_timeout = if cfg!(test) {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(30)
        };
        let retry_interval = if cfg!(test) {
            Duration::from_millis(10)
        } else {
            Duration::from_millis(50)
        };

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let start = Instant::now();
        loop {
            let acquired = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&lock_file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&lock_file),
            };

            match acquired {
                Ok(true) => {
                    tracing::trace!(path = %lock_path.display(), mode = mode.as_str(), "store lock acquired");
                    return Ok(Self {
                        lock_file,
                        lock_path: lock_path.to_path_buf(),
                        mode,
                    });
                }
                Ok(false) | Err(_) if start.elapsed() < lock_timeout => {
                    std::thread::sleep(retry_interval);
                }
                Ok(false) | Err(_) => {
                    bail!(
                        "Timed out waiting for {} lock on {}. Another process is updating the index.",
                        mode.as_str(),
                        lock_path.display()
                    );
                }
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock_file) {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "failed to release store lock");
        }
    }
}
