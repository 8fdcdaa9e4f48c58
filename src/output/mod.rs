//! Console output for the cadsync CLI.
//!
//! - Dimmed colors for routine messages
//! - Bold colors for warnings and errors
//! - Status labels colored by registration state
//! - Verbosity control (quiet, normal, verbose)

use crate::storage::Status;
use colored::{ColoredString, Colorize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity level for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress informational messages, show only warnings and errors.
    Quiet = 0,
    /// Default verbosity level, show all standard messages.
    Normal = 1,
    /// Show verbose debug messages in addition to standard output.
    Verbose = 2,
}

/// Global verbosity setting (default: Normal).
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Sets the global verbosity level for all output functions.
pub fn set_verbosity(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Gets the current global verbosity level.
pub fn get_verbosity() -> Verbosity {
    match VERBOSITY.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

/// Prints a success message in green (respects quiet mode).
pub fn success(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.green());
}

/// Prints an error message in bold red (always shown).
pub fn error(message: &str) {
    eprintln!("{}", message.red().bold());
}

/// Prints a warning message in bold yellow (always shown).
pub fn warning(message: &str) {
    eprintln!("{}", message.yellow().bold());
}

/// Prints an informational message in dimmed color (respects quiet mode).
pub fn info(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints a verbose debug message (only in verbose mode).
pub fn verbose(message: &str) {
    if get_verbosity() != Verbosity::Verbose {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints an action line: dimmed bold verb followed by the message.
pub fn action(verb: &str, message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{} {}", verb.dimmed().bold(), message);
}

/// Status text colored for listings: green when free, yellow when held by
/// `me`, red when held by someone else, cyan right after a sync.
#[must_use]
pub fn status_label(status: &Status, me: &str) -> ColoredString {
    match status {
        Status::Registered => status.as_str().green(),
        Status::CheckedOut(user) if user == me => user.as_str().yellow().bold(),
        Status::CheckedOut(user) => user.as_str().red(),
        Status::Stale => status.as_str().cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_round_trip() {
        let levels = [Verbosity::Quiet, Verbosity::Verbose, Verbosity::Normal];
        for level in &levels {
            set_verbosity(*level);
            assert_eq!(get_verbosity(), *level);
        }
    }

    #[test]
    fn test_status_label_text() {
        colored::control::set_override(false);
        assert_eq!(status_label(&Status::Registered, "alice").to_string(), "registered");
        assert_eq!(
            status_label(&Status::CheckedOut("bob".into()), "alice").to_string(),
            "bob"
        );
        assert_eq!(status_label(&Status::Stale, "alice").to_string(), "updated");
    }
}
