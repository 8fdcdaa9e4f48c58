use crate::CadsyncContext;
use crate::error::{VaultError, classify};
use crate::output;
use crate::sync::SyncReport;
use anyhow::Result;

/// Execute sync command - bring the local replica in line with the project
///
/// # Errors
///
/// Returns an error if the vault cannot be opened, an index store fails, or
/// any replica object could not be synced.
pub fn execute(ctx: &CadsyncContext) -> Result<()> {
    let vault = ctx.vault()?;
    let report = vault.sync_to_local()?;
    print_report(&report);
    super::fail_if_any(report.failures.len(), "object")
}

/// Prints a sync outcome; shared with the watch loop.
pub fn print_report(report: &SyncReport) {
    for failure in &report.failures {
        let kind = classify(&failure.error).map_or("error", VaultError::kind);
        output::warning(&format!(
            "Could not sync {} ({kind}): {:#}",
            failure.path.display(),
            failure.error
        ));
    }

    if report.changed() {
        output::success(&format!(
            "Local vault synced: {} created, {} updated, {} removed",
            report.created, report.updated, report.removed
        ));
    } else {
        output::info("Local vault already up to date");
    }
    if report.kept_checked_out > 0 {
        output::verbose(&format!(
            "Kept {} checked-out document(s) untouched",
            report.kept_checked_out
        ));
    }
}
