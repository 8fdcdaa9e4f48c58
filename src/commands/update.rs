use crate::CadsyncContext;
use crate::output;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Execute update command - rescan the canonical tree into the project index
///
/// A root given on the command line becomes `core.project_root`.
///
/// # Errors
///
/// Returns an error if:
/// - No project root is given or configured
/// - The configuration cannot be saved
/// - The rescan fails
/// - Some scanned objects could not be write-protected
pub fn execute(ctx: &mut CadsyncContext, root: Option<PathBuf>) -> Result<()> {
    if let Some(root) = root {
        let root = root
            .canonicalize()
            .with_context(|| format!("Project root not found: {}", root.display()))?;
        ctx.config.core.project_root = Some(root);
        ctx.config.save(&ctx.config_path)?;
    }

    let root = ctx.config.project_root()?.to_path_buf();
    let vault = ctx.vault()?;
    output::info(&format!("Scanning {}", root.display()));
    let report = vault.reindex(&root)?;

    for failure in &report.protect_failures {
        output::warning(&format!(
            "Could not write-protect {}: {:#}",
            failure.path.display(),
            failure.error
        ));
    }

    if report.changed() {
        output::success(&format!(
            "Indexed {} objects: {} added, {} updated, {} removed",
            report.scanned, report.added, report.updated, report.removed
        ));
    } else {
        output::success(&format!("Index up to date ({} objects)", report.scanned));
    }

    super::fail_if_any(report.protect_failures.len(), "write-protect")
}
