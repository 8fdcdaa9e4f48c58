pub mod config;
pub mod documents;
pub mod register;
pub mod status;
pub mod sync;
pub mod update;
pub mod watch;

use anyhow::Result;

/// Turns a per-item failure count into the command's exit status.
fn fail_if_any(failures: usize, what: &str) -> Result<()> {
    if failures > 0 {
        anyhow::bail!(
            "{failures} {what}{} failed; see the warnings above",
            if failures == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
