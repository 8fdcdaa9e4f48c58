use crate::CadsyncContext;
use crate::mapping::strip_root;
use crate::output::{self, status_label};
use crate::storage::Entry;
use crate::utils::format_timestamp;
use crate::vault::common_root_of;
use anyhow::Result;
use colored::Colorize;

/// Execute status command - show the project tree with registration state
///
/// # Errors
///
/// Returns an error if the vault cannot be opened or the project index
/// cannot be read.
pub fn execute(ctx: &CadsyncContext, short: bool) -> Result<()> {
    let vault = ctx.vault()?;
    let data = vault.project().read()?;
    if data.is_empty() {
        output::info("Project index is empty; run 'cadsync update' first");
        return Ok(());
    }

    let root = common_root_of(&data);
    let me = vault.user();
    let entries: Vec<&Entry> = data.list(None).collect();

    if short {
        for entry in entries.iter().filter(|e| !e.is_dir()) {
            println!(
                "{:<12} {}",
                status_label(&entry.status, me),
                relative(&entry.path, &root)
            );
        }
        return Ok(());
    }

    println!("{}", root.bold());
    for entry in entries {
        let rel = relative(&entry.path, &root);
        let depth = rel.matches('/').count() + 1;
        let indent = "  ".repeat(depth);
        if entry.is_dir() {
            println!("{indent}{}/", entry.name.blue().bold());
        } else {
            println!(
                "{indent}{:<32} {:<12} {}",
                entry.name,
                status_label(&entry.status, me),
                format_timestamp(&entry.last_modified).dimmed()
            );
        }
    }

    if let Some(editor) = &data.last_editor {
        println!("\nLast change by {}", editor.bold());
    }
    Ok(())
}

/// Path below the common root, or the full path if it is outside it.
fn relative<'a>(path: &'a str, root: &str) -> &'a str {
    strip_root(path, root).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths() {
        assert_eq!(relative("/srv/CAD/A/part.m3d", "/srv/CAD"), "A/part.m3d");
        assert_eq!(relative("/other/x.m3d", "/srv/CAD"), "/other/x.m3d");
        assert_eq!(relative("/a.m3d", "/"), "a.m3d");
    }
}
