/// Durable, lock-protected index file
pub mod index;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::Metadata;
use std::path::Path;

use crate::error::VaultError;

/// Text stored for a free, checked-in document.
pub const REGISTERED_MARKER: &str = "registered";

/// Text stored for an entry just rewritten by a sync.
pub const STALE_MARKER: &str = "updated";

/// Kind of filesystem object an [`Entry`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file (a CAD document).
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Lowercase name as shown in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }

    /// Kind of the object described by `metadata`.
    #[must_use]
    pub fn of(metadata: &Metadata) -> Self {
        if metadata.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration state of an entry.
///
/// The stored text form is `registered`, the holder's username, or `updated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Checked in: read-only everywhere, no owner.
    Registered,
    /// Checked out and writable for this user only.
    CheckedOut(String),
    /// Rewritten by the last sync.
    Stale,
}

impl Status {
    /// Parses the stored text form.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            REGISTERED_MARKER => Self::Registered,
            STALE_MARKER => Self::Stale,
            user => Self::CheckedOut(user.to_string()),
        }
    }

    /// Stored text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Registered => REGISTERED_MARKER,
            Self::CheckedOut(user) => user,
            Self::Stale => STALE_MARKER,
        }
    }

    /// Username holding the checkout, if any.
    #[must_use]
    pub fn holder(&self) -> Option<&str> {
        match self {
            Self::CheckedOut(user) => Some(user),
            Self::Registered | Self::Stale => None,
        }
    }

    #[must_use]
    pub fn is_checked_out_by(&self, user: &str) -> bool {
        self.holder() == Some(user)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record for one tracked filesystem object.
///
/// `path` is the canonical `/`-separated path in the project index and the
/// native local path in a user index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Base name of the object
    pub name: String,
    /// Key of the entry in its index
    pub path: String,
    /// Registration state
    pub status: Status,
    /// File or directory
    pub kind: EntryKind,
    /// Modification time, whole seconds, local time without zone
    pub last_modified: NaiveDateTime,
}

impl Entry {
    /// Creates an entry, deriving `name` from the last path segment.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        kind: EntryKind,
        status: Status,
        last_modified: NaiveDateTime,
    ) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            status,
            kind,
            last_modified,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Last segment of a path written with either separator.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
}

/// Modification time of `metadata` in the index's timestamp format.
///
/// # Errors
///
/// Returns an error if the platform does not report modification times.
pub fn modified_time(metadata: &Metadata) -> Result<NaiveDateTime> {
    let modified = metadata.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local().trunc_subsecs(0))
}

/// Modification time of the object at `path`.
///
/// # Errors
///
/// Returns [`VaultError::Filesystem`] if the object cannot be stat'ed.
pub fn modified_time_of(path: &Path) -> Result<NaiveDateTime> {
    let metadata = std::fs::metadata(path).map_err(|e| VaultError::filesystem(path, e))?;
    modified_time(&metadata)
}

/// Contents of one index store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexData {
    /// On-disk format version
    pub version: u32,
    /// Entries keyed by path
    pub entries: BTreeMap<String, Entry>,
    /// Username of the last actor to mutate the canonical tree
    pub last_editor: Option<String>,
}

impl Default for IndexData {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexData {
    /// Current on-disk format version.
    pub const VERSION: u32 = 1;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: Self::VERSION,
            entries: BTreeMap::new(),
            last_editor: None,
        }
    }

    /// Inserts or replaces the entry stored under `entry.path`.
    pub fn upsert(&mut self, entry: Entry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.entries.get_mut(path)
    }

    /// Entry called `name`, of any kind.
    ///
    /// # Errors
    ///
    /// See [`Self::find`].
    pub fn get_by_name(&self, name: &str) -> Result<&Entry, VaultError> {
        self.find(name, None)
    }

    /// Entry called `name`, optionally restricted to one kind.
    ///
    /// `name` is a base name or a path tail such as `A/part.m3d`. Tails match
    /// on whole segments, so a full canonical path works too.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] when nothing matches and
    /// [`VaultError::Ambiguous`] when more than one entry does.
    pub fn find(&self, name: &str, kind: Option<EntryKind>) -> Result<&Entry, VaultError> {
        let wanted = name.replace('\\', "/");
        let wanted = wanted.trim_matches('/');
        let suffix = format!("/{wanted}");

        let mut found = self
            .list(kind)
            .filter(|entry| !wanted.is_empty() && (entry.path == wanted || entry.path.ends_with(&suffix)));
        let first = found
            .next()
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        let others: Vec<&Entry> = found.collect();
        if others.is_empty() {
            return Ok(first);
        }

        Err(VaultError::Ambiguous {
            name: name.to_string(),
            candidates: std::iter::once(first)
                .chain(others)
                .map(|entry| entry.path.clone())
                .collect(),
        })
    }

    /// Entries in path order, optionally restricted to one kind.
    pub fn list(&self, kind: Option<EntryKind>) -> impl Iterator<Item = &Entry> {
        self.entries
            .values()
            .filter(move |entry| kind.is_none_or(|k| entry.kind == k))
    }

    #[must_use]
    pub fn last_modified(&self, path: &str) -> Option<NaiveDateTime> {
        self.entries.get(path).map(|entry| entry.last_modified)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
