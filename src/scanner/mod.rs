/// Exclusion rules applied while walking a tree.
pub mod rules;

/// Lazy depth-first walk of a canonical tree.
pub mod tree;

pub use rules::ScanRules;
pub use tree::{ScannedEntry, TreeScanner};
