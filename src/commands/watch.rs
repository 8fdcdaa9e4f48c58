use crate::CadsyncContext;
use crate::cad::{CadSession, DetachedSession};
use crate::output;
use crate::storage::Entry;
use crate::watch::{ControlLoop, Handled, Prompt, spawn_session_watcher, spawn_store_watcher};
use anyhow::Result;
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;

/// Asks on the terminal whether to check out the focused document.
pub struct StdinPrompt {
    /// Answer "no" without reading stdin
    pub non_interactive: bool,
}

impl Prompt for StdinPrompt {
    fn confirm_unregister(&mut self, entry: &Entry) -> bool {
        if self.non_interactive {
            return false;
        }
        print!("{} is registered. Check it out for editing? [y/N]: ", entry.name);
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(_) => input.trim().eq_ignore_ascii_case("y"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read answer");
                false
            }
        }
    }
}

/// Execute watch command - follow the project and the CAD session
///
/// Runs until the process is interrupted or both watchers stop.
///
/// # Errors
///
/// Returns an error if the vault cannot be opened, an interval is invalid,
/// or a watcher thread cannot be started.
pub fn execute(ctx: &CadsyncContext) -> Result<()> {
    let vault = ctx.vault()?;
    let watch = &ctx.config.watch;

    let initial = vault.sync_to_local()?;
    super::sync::print_report(&initial);

    let (_store, store_rx) = spawn_store_watcher(vault.project().clone(), watch.poll_interval()?)?;
    let (_session, session_rx) = spawn_session_watcher(
        || Ok(Box::new(DetachedSession) as Box<dyn CadSession>),
        watch.session_poll_interval()?,
    )?;

    output::info(&format!(
        "Watching {} as {} (Ctrl-C to stop)",
        vault.project().path().display(),
        vault.user()
    ));

    let mut cad = DetachedSession;
    let mut prompt = StdinPrompt {
        non_interactive: ctx.non_interactive,
    };
    let mut control = ControlLoop::new(&vault, &mut cad, &mut prompt)
        .watch(store_rx)
        .watch(session_rx);

    let stop = AtomicBool::new(false);
    control.run(&stop, watch.drain_interval()?, report);
    Ok(())
}

fn report(handled: &Handled) {
    match handled {
        Handled::Synced(sync) => super::sync::print_report(sync),
        Handled::SelfChange => output::verbose("Project changed by you; nothing to sync"),
        Handled::Unregistered(name) => output::success(&format!("Checked out {name}")),
        Handled::Declined(name) => output::info(&format!("{name} stays registered (read-only)")),
        Handled::Ignored => {}
        Handled::Failed(message) => output::warning(message),
    }
}
