use crate::CadsyncContext;
use crate::cad::DetachedSession;
use crate::output;
use anyhow::Result;

/// Execute unregister command - check a document out for editing
///
/// # Errors
///
/// Returns an error if the document is unknown, held by someone else, or
/// its local copy cannot be prepared.
pub fn unregister(ctx: &CadsyncContext, name: &str) -> Result<()> {
    let vault = ctx.vault()?;
    let entry = vault.unregister(name, &mut DetachedSession)?;
    output::success(&format!("Checked out {} ({})", entry.name, entry.path));
    Ok(())
}

/// Execute register command - check a document back in
///
/// # Errors
///
/// Returns an error if the document is unknown, not held by the current
/// user, or its local copy is missing.
pub fn register(ctx: &CadsyncContext, name: &str) -> Result<()> {
    let vault = ctx.vault()?;
    let entry = vault.register(name, &mut DetachedSession)?;
    output::success(&format!("Registered {} ({})", entry.name, entry.path));
    Ok(())
}
