//! Command-line interface definitions for cadsync.
//!
//! The definitions are shared between the main binary and the xtask man
//! page generator.

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::cad::DocumentKind;

/// Main CLI structure for cadsync.
#[derive(Parser)]
#[command(
    name = "cadsync",
    version = crate::VERSION,
    about = "Check-out/check-in vault for shared CAD document trees",
    long_about = "Mirrors a shared CAD tree into a read-only local replica and coordinates \
                  who may edit which document"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// All available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Rescan the canonical tree into the project index
    Update {
        /// Canonical tree root; saved as core.project_root
        root: Option<PathBuf>,
    },

    /// Bring the local replica in line with the project index
    Sync,

    /// Check a document back in, publishing local edits
    Register {
        /// Document file name, or `FOLDER/NAME` when several folders hold one
        name: String,
    },

    /// Check a document out for editing
    Unregister {
        /// Document file name, or `FOLDER/NAME` when several folders hold one
        name: String,
    },

    /// Show the project tree with registration status
    Status {
        /// One line per document: status and path
        #[arg(short, long)]
        short: bool,
    },

    /// Open a document's local copy in the CAD application
    Open {
        /// Document file name, or `FOLDER/NAME` when several folders hold one
        name: String,
    },

    /// Create a document in a canonical directory
    New {
        /// Document kind
        #[arg(value_enum)]
        kind: KindArg,

        /// Directory name the document goes into
        dir: String,

        /// Designation, used as the file name; for drawings, the source
        /// part or assembly designation
        designation: String,

        /// Document title
        #[arg(default_value = "")]
        title: String,
    },

    /// Delete a document you have checked out
    Rm {
        /// Document file name, or `FOLDER/NAME` when several folders hold one
        name: String,
    },

    /// Create a folder in the canonical tree
    Mkdir {
        /// Name of the existing parent directory
        parent: String,

        /// New folder name
        name: String,
    },

    /// Watch the project and the CAD session until interrupted
    Watch,

    /// Get and set configuration options
    Config {
        /// Configuration key
        key: Option<String>,

        /// Configuration value to set
        value: Option<String>,

        /// Unset the configuration key
        #[arg(long)]
        unset: bool,

        /// List all configuration values
        #[arg(short, long)]
        list: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Document kinds accepted by `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Part,
    Assembly,
    Drawing,
}

impl From<KindArg> for DocumentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Part => Self::Part,
            KindArg::Assembly => Self::Assembly,
            KindArg::Drawing => Self::Drawing,
        }
    }
}
