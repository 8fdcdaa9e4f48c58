//! Classified failures of the synchronisation engine.
//!
//! Engine functions return `anyhow::Result`, but every failure a caller may
//! want to branch on is raised as a [`VaultError`] so it can be recovered with
//! `err.downcast_ref::<VaultError>()`.

use crate::storage::Status;
use std::io;
use std::path::{Path, PathBuf};

/// Failure kinds surfaced by indexing, syncing and registration.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No index entry carries the given document name or path.
    #[error("'{0}' is not known to the index")]
    NotFound(String),

    /// A bare document name matches more than one indexed path.
    #[error("'{name}' is ambiguous; qualify it with its folder: {}", .candidates.join(", "))]
    Ambiguous {
        /// Name as given.
        name: String,
        /// Canonical paths sharing that name.
        candidates: Vec<String>,
    },

    /// `register` was attempted without a local working copy.
    #[error("local copy is missing: {}", .0.display())]
    LocalFileMissing(PathBuf),

    /// A canonical path does not live under the common root.
    #[error("path '{path}' is outside the common root '{root}'")]
    Mapping {
        /// Offending canonical path.
        path: String,
        /// Root it was expected to live under.
        root: String,
    },

    /// Permission, in-use file, disk full and friends.
    #[error("filesystem operation failed on {}: {source}", .path.display())]
    Filesystem {
        /// Object the operation was applied to.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The index store could not be read, locked or written.
    #[error("index store failure: {0}")]
    Storage(String),

    /// Another user already holds the checkout.
    #[error("'{name}' is checked out by {holder}")]
    Conflict {
        /// Document name.
        name: String,
        /// Username currently holding the checkout.
        holder: String,
    },

    /// `register` was attempted on a document the caller does not hold.
    #[error("'{name}' is not checked out by you (status: {status})")]
    NotCheckedOut {
        /// Document name.
        name: String,
        /// Status found in the project index.
        status: Status,
    },
}

impl VaultError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn filesystem(path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short label used in reports and log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not found",
            Self::Ambiguous { .. } => "ambiguous",
            Self::LocalFileMissing(_) => "local file missing",
            Self::Mapping { .. } => "mapping",
            Self::Filesystem { .. } => "filesystem",
            Self::Storage(_) => "storage",
            Self::Conflict { .. } => "conflict",
            Self::NotCheckedOut { .. } => "not checked out",
        }
    }
}

/// Returns the classified error inside an `anyhow::Error`, if there is one.
#[must_use]
pub fn classify(err: &anyhow::Error) -> Option<&VaultError> {
    err.chain().find_map(|cause| cause.downcast_ref::<VaultError>())
}
