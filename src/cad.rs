//! Seam to the CAD authoring application.
//!
//! The engine only ever calls into a [`CadSession`]; nothing in the CAD
//! application calls back. Sessions are single-threaded: a watcher thread
//! builds its own session instead of borrowing the main thread's.

use anyhow::{Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of document the CAD application can author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Part,
    Assembly,
    Drawing,
}

impl DocumentKind {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Part => "m3d",
            Self::Assembly => "a3d",
            Self::Drawing => "cdw",
        }
    }

    /// Kind of a document judged by its file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        [Self::Part, Self::Assembly, Self::Drawing]
            .into_iter()
            .find(|kind| ext.eq_ignore_ascii_case(kind.extension()))
    }

    /// File name a new document of this kind gets.
    #[must_use]
    pub fn file_name(self, designation: &str) -> String {
        format!("{designation}.{}", self.extension())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Part => "part",
            Self::Assembly => "assembly",
            Self::Drawing => "drawing",
        })
    }
}

/// Operations the engine needs from a live CAD session.
pub trait CadSession {
    /// Opens a document, read-only or for editing.
    fn open(&mut self, path: &Path, read_only: bool) -> Result<()>;

    /// Closes the document that currently has focus.
    fn close_active(&mut self) -> Result<()>;

    /// File name of the document that currently has focus, if any.
    fn active_document_name(&mut self) -> Result<Option<String>>;

    /// Switches an open document between read-only and editable.
    fn set_read_only(&mut self, path: &Path, read_only: bool) -> Result<()>;

    /// Authors a new part or assembly named `<designation>.<ext>` in `dir`
    /// and returns its path.
    fn create_document(
        &mut self,
        kind: DocumentKind,
        dir: &Path,
        designation: &str,
        title: &str,
    ) -> Result<PathBuf>;

    /// Derives a drawing from `source` and saves it beside it as `.cdw`.
    fn create_drawing(&mut self, source: &Path) -> Result<PathBuf>;
}

/// Tells the session about a changed write mode of `path`.
///
/// When the document is the active one it is closed and opened again in the
/// new mode, otherwise only its mode is switched.
///
/// # Errors
///
/// Returns the session's error.
pub fn reopen(session: &mut dyn CadSession, path: &Path, read_only: bool) -> Result<()> {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    if name.is_some() && session.active_document_name()? == name {
        session.close_active()?;
        session.open(path, read_only)
    } else {
        session.set_read_only(path, read_only)
    }
}

/// Session used when no CAD application is attached.
///
/// Mode changes and focus queries are no-ops; authoring fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSession;

impl CadSession for DetachedSession {
    fn open(&mut self, path: &Path, read_only: bool) -> Result<()> {
        tracing::info!(path = %path.display(), read_only, "no CAD session attached; open the document manually");
        Ok(())
    }

    fn close_active(&mut self) -> Result<()> {
        Ok(())
    }

    fn active_document_name(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    fn set_read_only(&mut self, _path: &Path, _read_only: bool) -> Result<()> {
        Ok(())
    }

    fn create_document(
        &mut self,
        kind: DocumentKind,
        _dir: &Path,
        designation: &str,
        _title: &str,
    ) -> Result<PathBuf> {
        bail!("Cannot create {kind} '{designation}': no CAD application is attached")
    }

    fn create_drawing(&mut self, source: &Path) -> Result<PathBuf> {
        bail!(
            "Cannot derive a drawing from {}: no CAD application is attached",
            source.display()
        )
    }
}
