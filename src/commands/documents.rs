//! Document and folder commands: `open`, `new`, `rm` and `mkdir`.

use crate::CadsyncContext;
use crate::cad::{DetachedSession, DocumentKind};
use crate::error::{VaultError, classify};
use crate::output;
use anyhow::{Result, bail};

/// Execute open command - hand the local copy to the CAD application
///
/// # Errors
///
/// Returns an error if the document is unknown or has no local copy.
pub fn open(ctx: &CadsyncContext, name: &str) -> Result<()> {
    let vault = ctx.vault()?;
    let opened = vault.documents().open_document(name, &mut DetachedSession)?;
    let mode = if opened.read_only { "read-only" } else { "editable" };
    output::action("Opened", &format!("{} ({mode})", opened.path.display()));
    Ok(())
}

/// Execute new command - author a document in the canonical tree
///
/// For drawings, `designation` names the source part or assembly in `dir`.
///
/// # Errors
///
/// Returns an error if the directory or drawing source is unknown, the
/// document exists, or no CAD application can create it.
pub fn new(
    ctx: &CadsyncContext,
    kind: DocumentKind,
    dir: &str,
    designation: &str,
    title: &str,
) -> Result<()> {
    let vault = ctx.vault()?;
    let documents = vault.documents();
    let mut cad = DetachedSession;

    let entry = if kind == DocumentKind::Drawing {
        let mut source = None;
        for kind in [DocumentKind::Part, DocumentKind::Assembly] {
            let qualified = format!("{dir}/{}", kind.file_name(designation));
            match vault.project().get_by_name(&qualified) {
                Ok(_) => {
                    source = Some(qualified);
                    break;
                }
                Err(e) if matches!(classify(&e), Some(VaultError::NotFound(_))) => {}
                Err(e) => return Err(e),
            }
        }
        let Some(source) = source else {
            bail!("No part or assembly '{designation}' in {dir}");
        };
        documents.create_drawing(&source, &mut cad)?
    } else {
        documents.create_document(kind, dir, designation, title, &mut cad)?
    };

    output::success(&format!("Created {} (checked out to {})", entry.path, vault.user()));
    Ok(())
}

/// Execute rm command - delete a document held by the current user
///
/// # Errors
///
/// Returns an error if the document is unknown, not held by the current
/// user, or cannot be removed from disk.
pub fn rm(ctx: &CadsyncContext, name: &str) -> Result<()> {
    let vault = ctx.vault()?;
    let entry = vault.documents().delete_document(name)?;
    output::success(&format!("Deleted {}", entry.path));
    Ok(())
}

/// Execute mkdir command - create a canonical folder
///
/// # Errors
///
/// Returns an error if the parent is unknown or the folder cannot be
/// created.
pub fn mkdir(ctx: &CadsyncContext, parent: &str, name: &str) -> Result<()> {
    let vault = ctx.vault()?;
    let entry = vault.documents().create_folder(parent, name)?;
    output::success(&format!("Created folder {}", entry.path));
    Ok(())
}
